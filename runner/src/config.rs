use crate::context::DEFAULT_INDEX_VARIABLE;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// used when `--config` is not given and the file exists in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "scmtiles.yaml";

pub const STAGE_RUN: &str = "run";
pub const STAGE_POST_PROCESS: &str = "pp";
pub const STAGE_CLEANUP: &str = "cleanup";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to open config file {path:?}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Config file is malformed: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Scheduler not supported: {0}")]
    UnsupportedScheduler(String),
    #[error("Stage '{0}' is not defined")]
    UnknownStage(String),
    #[error("Walltime '{0}' is not of the form HH:MM")]
    InvalidWalltime(String),
}

/// Maximum wall-clock time declared to the scheduler, `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Walltime {
    pub hours: u32,
    pub minutes: u32,
}

impl FromStr for Walltime {
    type Err = ConfigErrors;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigErrors::InvalidWalltime(value.to_string());
        let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
        let hours = hours.parse::<u32>().map_err(|_| invalid())?;
        let minutes = minutes.parse::<u32>().map_err(|_| invalid())?;

        if minutes >= 60 || (hours == 0 && minutes == 0) {
            return Err(invalid());
        }

        Ok(Self { hours, minutes })
    }
}

impl TryFrom<String> for Walltime {
    type Error = ConfigErrors;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Walltime> for String {
    fn from(walltime: Walltime) -> Self {
        walltime.to_string()
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

/// Condition the dependent stage waits for on every element of the primary array
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCondition {
    /// all elements finished successfully
    #[default]
    Done,
    /// all elements finished, successfully or not
    Ended,
}

impl DependencyCondition {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Ended => "ended",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // Name of the submission backend, see Schedulers::load for the selection process
    #[serde(default = "default_scheduler_name")]
    pub name: String,
    // submission command, looked up in PATH unless absolute
    #[serde(default = "default_scheduler_command")]
    pub command: String,
    pub queue: Option<String>,
    // environment variable carrying the array index of an element
    #[serde(default = "default_index_variable")]
    pub index_variable: String,
    #[serde(default)]
    pub dependency: DependencyCondition,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler_name(),
            command: default_scheduler_command(),
            queue: None,
            index_variable: default_index_variable(),
            dependency: DependencyCondition::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct PathsConfig {
    pub configs: PathBuf,
    pub logs: PathBuf,
    pub template: PathBuf,
    // parent of the per time window directories holding tile output
    pub work_dir: PathBuf,
    // where the post-processed grid files end up
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            configs: PathBuf::from("configs"),
            logs: PathBuf::from("logs"),
            template: PathBuf::from("templates/run.cfg.in"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    // job script handed to the scheduler for every element
    pub script: PathBuf,
    // upper bound of simultaneously running elements of this stage
    pub concurrency: u32,
    pub walltime: Option<Walltime>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    // stages given here replace the built-in stage of the same name
    #[serde(default)]
    pub stages: BTreeMap<String, StageConfig>,
}

impl RunnerConfig {
    /// Built-in configuration with the default stages
    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        config.merge_default_stages();

        config
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigErrors> {
        let mut config: Self = serde_yaml::from_str(source)?;
        config.merge_default_stages();

        Ok(config)
    }

    /// Load the config file at `path`, or the default file if present, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        match File::open(&path) {
            Ok(file) => {
                debug!(path = ?path, "Loading config");
                let mut config: Self = serde_yaml::from_reader(file)?;
                config.merge_default_stages();

                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                debug!("No config file found, using defaults");

                Ok(Self::with_defaults())
            }
            Err(source) => Err(ConfigErrors::Read { path, source }),
        }
    }

    fn merge_default_stages(&mut self) {
        for (name, stage) in default_stages() {
            self.stages.entry(name).or_insert(stage);
        }
    }

    pub fn stage(&self, name: &str) -> Result<&StageConfig, ConfigErrors> {
        self.stages
            .get(name)
            .ok_or_else(|| ConfigErrors::UnknownStage(name.to_string()))
    }

    /// check the whole config, returns true if any error was found
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        match self.scheduler.name.as_str() {
            "lsf" | "dry-run" => {}
            name => {
                error!("scheduler.name ({name}) is not supported, please use `lsf` or `dry-run`");
                contains_error = true;
            }
        }

        if self.scheduler.command.trim().is_empty() {
            error!("scheduler.command cannot be empty");
            contains_error = true;
        }

        if self.scheduler.index_variable.trim().is_empty() {
            error!("scheduler.index_variable cannot be empty");
            contains_error = true;
        }

        for (name, stage) in self.stages.iter() {
            if !is_valid_name(name) {
                error!("stages.{name} is not a valid stage name, use letters, digits, '-' and '_'");
                contains_error = true;
            }

            if stage.concurrency == 0 {
                error!("stages.{name}.concurrency cannot be 0, no element would ever run");
                contains_error = true;
            }

            if stage.walltime.is_none() {
                warn!("stages.{name}.walltime is not set, the queue default applies");
            }
        }

        contains_error
    }
}

/// job and stage names end up inside scheduler expressions like `name[1-4]%5`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn default_stages() -> BTreeMap<String, StageConfig> {
    BTreeMap::from([
        (
            STAGE_RUN.to_string(),
            StageConfig {
                script: PathBuf::from("run.bsub"),
                concurrency: 20,
                walltime: Some(Walltime {
                    hours: 6,
                    minutes: 0,
                }),
            },
        ),
        (
            STAGE_POST_PROCESS.to_string(),
            StageConfig {
                script: PathBuf::from("pp.bsub"),
                concurrency: 10,
                walltime: Some(Walltime {
                    hours: 2,
                    minutes: 0,
                }),
            },
        ),
        (
            STAGE_CLEANUP.to_string(),
            StageConfig {
                script: PathBuf::from("cleanup.bsub"),
                concurrency: 10,
                walltime: Some(Walltime {
                    hours: 0,
                    minutes: 30,
                }),
            },
        ),
    ])
}

fn default_scheduler_name() -> String {
    "lsf".to_string()
}

fn default_scheduler_command() -> String {
    "bsub".to_string()
}

fn default_index_variable() -> String {
    DEFAULT_INDEX_VARIABLE.to_string()
}
