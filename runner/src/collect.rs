//! Status of a finished launch, reconstructed from the element logs.

use crate::{
    array_spec::IndexRange,
    config::{STAGE_POST_PROCESS, STAGE_RUN},
    timing::{compute_start_time, IndexError, StartTime},
};
use itertools::Itertools;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

/// line LSF appends to the output of a successful job
pub const COMPLETION_MARKER: &str = "Successfully completed.";

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Failed to read log {path:?}")]
    Log { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Status of one array index, `None` where nothing is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStatus {
    pub index: i64,
    pub start_time: StartTime,
    pub run: Option<bool>,
    pub pp_generate: Option<bool>,
    pub pp_cleanup: Option<bool>,
}

impl ElementStatus {
    /// `index,YYYY-MM-DD HH:MM:SS,run[,generate[,cleanup]]`, unknown fields are left out
    pub fn to_csv(&self) -> String {
        let translate = |value: Option<bool>| value.map(|done| if done { "yes" } else { "no" });

        [
            Some(self.index.to_string()),
            Some(self.start_time.report()),
        ]
        .into_iter()
        .chain(
            [self.run, self.pp_generate, self.pp_cleanup]
                .into_iter()
                .map(|value| translate(value).map(str::to_string)),
        )
        .flatten()
        .join(",")
    }
}

/// `<output_dir>/scm_out.<YYYYMMDD_HHMMSS>.nc`
pub fn grid_output_path(output_dir: &Path, start_time: &StartTime) -> PathBuf {
    output_dir.join(format!("scm_out.{}.nc", start_time.compact()))
}

/// `None` if the log does not exist, otherwise whether the job reported success
fn stage_completed(path: &Path) -> Result<Option<bool>, CollectError> {
    match fs::read(path) {
        Ok(content) => Ok(Some(
            content
                .split(|byte| *byte == b'\n')
                .any(|line| line.starts_with(COMPLETION_MARKER.as_bytes())),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CollectError::Log {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct Collector {
    logs_dir: PathBuf,
    output_dir: PathBuf,
}

impl Collector {
    pub fn new(logs_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    fn log_path(&self, job_name: &str, stage: &str, index: i64) -> PathBuf {
        self.logs_dir.join(format!("{job_name}_{stage}.{index}.log"))
    }

    /// Status of a single index, `None` when the run stage never wrote a log
    pub fn element(
        &self,
        job_name: &str,
        index: i64,
        pp_only: bool,
    ) -> Result<Option<ElementStatus>, CollectError> {
        let start_time = compute_start_time(index)?;
        let mut status = ElementStatus {
            index,
            start_time,
            run: Some(true),
            pp_generate: None,
            pp_cleanup: None,
        };

        if !pp_only {
            match stage_completed(&self.log_path(job_name, STAGE_RUN, index))? {
                None => return Ok(None),
                Some(false) => {
                    status.run = Some(false);
                    return Ok(Some(status));
                }
                Some(true) => {}
            }
        }

        match stage_completed(&self.log_path(job_name, STAGE_POST_PROCESS, index))? {
            None => {}
            Some(true) => {
                status.pp_generate = Some(true);
                status.pp_cleanup = Some(true);
            }
            Some(false) => {
                // output may have been written before the cleanup ran out of time
                let output = grid_output_path(&self.output_dir, &start_time);
                debug!(output = ?output, "Post-processing incomplete, checking output");

                if output.exists() {
                    status.pp_generate = Some(true);
                    status.pp_cleanup = Some(false);
                } else {
                    status.pp_generate = Some(false);
                }
            }
        }

        Ok(Some(status))
    }

    pub fn collect(
        &self,
        job_name: &str,
        range: &IndexRange,
        pp_only: bool,
    ) -> Result<Vec<ElementStatus>, CollectError> {
        range
            .indices()
            .filter_map(|index| self.element(job_name, index, pp_only).transpose())
            .collect()
    }
}
