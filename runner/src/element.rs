use crate::{
    config::{is_valid_name, RunnerConfig},
    context::{ContextError, ExecutionContext},
    materialize::{ConfigMaterializer, MaterializeError},
    timing::StartTime,
};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, error, info};

/// argument token replaced by the path of the materialized config
pub const CONFIG_ARGUMENT: &str = "{config}";

#[derive(Error, Debug)]
pub enum ElementError {
    #[error("'{0}' is not a valid stage name, use letters, digits, '.', '-' and '_'")]
    InvalidStage(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("Failed to open log file {path:?}")]
    Log { path: PathBuf, source: io::Error },
    #[error("Failed to start {program}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with status {status:?}, see {log:?}")]
    Failed {
        program: String,
        status: Option<i32>,
        log: PathBuf,
    },
}

/// Context of the running array element, from `--index` or the scheduler's variable
pub fn resolve_context(
    index: Option<i64>,
    variable: &str,
) -> Result<ExecutionContext, ContextError> {
    match index {
        Some(index) => ExecutionContext::new(index),
        None => ExecutionContext::from_env(variable),
    }
}

/// `<logs_dir>/<stage>.<start_time>.log`
pub fn element_log_path(logs_dir: &Path, stage: &str, start_time: &StartTime) -> PathBuf {
    logs_dir.join(format!("{stage}.{start_time}.log"))
}

/// substitute the config path, appending it if no argument asks for it
fn program_arguments(args: &[String], config: &Path) -> Vec<String> {
    let config = config.to_string_lossy();

    if args.iter().any(|arg| arg.contains(CONFIG_ARGUMENT)) {
        args.iter()
            .map(|arg| arg.replace(CONFIG_ARGUMENT, &config))
            .collect()
    } else {
        let mut arguments = args.to_vec();
        arguments.push(config.into_owned());

        arguments
    }
}

/// Runs one stage program for a single array element
#[derive(Debug)]
pub struct ElementRunner<'c> {
    config: &'c RunnerConfig,
    context: ExecutionContext,
}

impl<'c> ElementRunner<'c> {
    pub fn new(config: &'c RunnerConfig, context: ExecutionContext) -> Self {
        Self { config, context }
    }

    pub fn start_time(&self) -> StartTime {
        self.context.start_time()
    }

    /// Materialize the config of this element and run `program` with it.
    ///
    /// stdout and stderr of the program go to the element log, which is
    /// returned on success.
    #[tracing::instrument(level = "info", skip(self, args), fields(index = self.context.index()))]
    pub fn exec(
        &self,
        stage: &str,
        program: &str,
        args: &[String],
    ) -> Result<PathBuf, ElementError> {
        if !is_valid_name(stage) || stage.starts_with('.') {
            return Err(ElementError::InvalidStage(stage.to_string()));
        }

        let start_time = self.start_time();
        let config_path =
            ConfigMaterializer::new(&self.config.paths.template, &self.config.paths.configs)
                .materialize(&start_time)?;

        let log = element_log_path(&self.config.paths.logs, stage, &start_time);
        let log_error = |source: io::Error| ElementError::Log {
            path: log.clone(),
            source,
        };
        fs::create_dir_all(&self.config.paths.logs).map_err(log_error)?;
        let stdout = File::create(&log).map_err(log_error)?;
        let stderr = stdout.try_clone().map_err(log_error)?;

        let arguments = program_arguments(args, &config_path);
        debug!("Running {program} {arguments:?}");
        let start = Instant::now();

        let status = Command::new(program)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| ElementError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !status.success() {
            error!(status = ?status.code(), "{program} failed for {start_time}");

            return Err(ElementError::Failed {
                program: program.to_string(),
                status: status.code(),
                log,
            });
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "{stage} finished for {start_time}"
        );

        Ok(log)
    }
}
