pub mod dry_run;
pub mod lsf;

use crate::{
    array_spec::IndexRange,
    config::{ConfigErrors, DependencyCondition, SchedulerConfig, Walltime},
};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Per element index placeholder expanded by the scheduler in log paths
pub const INDEX_PLACEHOLDER: &str = "%I";

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to open job script {path:?}")]
    Script { path: PathBuf, source: io::Error },
    #[error("Failed to run submission command {command}")]
    Spawn { command: String, source: io::Error },
    #[error("Scheduler rejected the submission (status {status:?}): {stderr}")]
    Rejected { status: Option<i32>, stderr: String },
}

/// Wait for every element of another array job, i.e. `done(exp1_run[*])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub job_name: String,
    pub condition: DependencyCondition,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}[*])", self.condition.keyword(), self.job_name)
    }
}

/// Everything the scheduler needs to start one array job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArraySubmission {
    /// `<job_base_name>_<stage>`
    pub job_name: String,
    pub index_range: IndexRange,
    /// bounds running elements of this submission only
    pub concurrency: u32,
    pub dependency: Option<Dependency>,
    /// contains [`INDEX_PLACEHOLDER`], used for stdout and stderr
    pub log_path: PathBuf,
    pub script: PathBuf,
    pub walltime: Option<Walltime>,
}

impl JobArraySubmission {
    /// `name[range]%cap`
    pub fn array_spec(&self) -> String {
        format!(
            "{}[{}]%{}",
            self.job_name, self.index_range, self.concurrency
        )
    }
}

/// Outcome of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub job_name: String,
    /// scheduler job id, if the scheduler reported one
    pub job_id: Option<String>,
}

pub trait Scheduler {
    fn submit(
        &mut self,
        submission: &JobArraySubmission,
    ) -> Result<SubmissionReceipt, SchedulerError>;
}

#[derive(Debug, Clone)]
pub enum Schedulers {
    Lsf(lsf::LsfScheduler),
    DryRun(dry_run::DryRunScheduler),
}

impl Schedulers {
    pub fn load(config: &SchedulerConfig) -> Result<Self, ConfigErrors> {
        match config.name.as_str() {
            "lsf" => Ok(Self::Lsf(lsf::LsfScheduler::load(config))),
            "dry-run" => Ok(Self::DryRun(dry_run::DryRunScheduler::load(config))),
            _ => Err(ConfigErrors::UnsupportedScheduler(config.name.clone())),
        }
    }
}

impl Scheduler for Schedulers {
    fn submit(
        &mut self,
        submission: &JobArraySubmission,
    ) -> Result<SubmissionReceipt, SchedulerError> {
        match self {
            Self::Lsf(scheduler) => scheduler.submit(submission),
            Self::DryRun(scheduler) => scheduler.submit(submission),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records submissions instead of talking to a cluster
    #[derive(Debug, Default)]
    pub struct RecordingScheduler {
        pub submissions: Vec<JobArraySubmission>,
        /// reject the submission with this position (0 based)
        pub reject_at: Option<usize>,
    }

    impl RecordingScheduler {
        pub fn rejecting(position: usize) -> Self {
            Self {
                reject_at: Some(position),
                ..Self::default()
            }
        }
    }

    impl Scheduler for RecordingScheduler {
        fn submit(
            &mut self,
            submission: &JobArraySubmission,
        ) -> Result<SubmissionReceipt, SchedulerError> {
            let position = self.submissions.len();
            self.submissions.push(submission.clone());

            if self.reject_at == Some(position) {
                return Err(SchedulerError::Rejected {
                    status: Some(255),
                    stderr: "Bad queue name".to_string(),
                });
            }

            Ok(SubmissionReceipt {
                job_name: submission.job_name.clone(),
                job_id: Some((1000 + position).to_string()),
            })
        }
    }
}
