use crate::{
    array_spec::IndexRange,
    config::{is_valid_name, StageConfig},
    scheduler::{
        Dependency, JobArraySubmission, Scheduler, SchedulerError, SubmissionReceipt,
        INDEX_PLACEHOLDER,
    },
};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Job script {0:?} is missing or unreadable")]
    MissingScript(PathBuf),
    #[error("'{0}' is not a valid job name, use letters, digits, '.', '-' and '_'")]
    InvalidName(String),
    #[error("Concurrency of {0} must be at least 1")]
    InvalidConcurrency(String),
    #[error("Failed to create log directory {path:?}")]
    LogDirectory { path: PathBuf, source: io::Error },
    #[error("Submission of {job_name} failed")]
    SubmissionFailed {
        job_name: String,
        source: SchedulerError,
    },
}

/// `<logs_dir>/<job_name>.%I.log`
pub fn log_pattern(logs_dir: &Path, job_name: &str) -> PathBuf {
    logs_dir.join(format!("{job_name}.{INDEX_PLACEHOLDER}.log"))
}

/// readable regular file, anything else can't be fed to the scheduler
pub fn check_script(path: &Path) -> Result<(), SubmissionError> {
    if path.is_file() && File::open(path).is_ok() {
        Ok(())
    } else {
        Err(SubmissionError::MissingScript(path.to_path_buf()))
    }
}

/// Turns one stage of a launch into a single array job submission
#[derive(Debug)]
pub struct ArraySubmitter<S> {
    scheduler: S,
    logs_dir: PathBuf,
}

impl<S: Scheduler> ArraySubmitter<S> {
    pub fn new(scheduler: S, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            logs_dir: logs_dir.into(),
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Submit `stage` of `job_name` over `index_range`.
    ///
    /// Every precondition is checked before the scheduler is called, a missing
    /// script never results in a submission. A rejected submission is returned
    /// as is, there are no retries.
    #[tracing::instrument(level = "debug", skip(self, stage, index_range, dependency))]
    pub fn submit(
        &mut self,
        job_name: &str,
        stage_name: &str,
        stage: &StageConfig,
        index_range: &IndexRange,
        dependency: Option<Dependency>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        for name in [job_name, stage_name] {
            if !is_valid_name(name) {
                return Err(SubmissionError::InvalidName(name.to_string()));
            }
        }

        let job_name = format!("{job_name}_{stage_name}");

        if stage.concurrency == 0 {
            return Err(SubmissionError::InvalidConcurrency(job_name));
        }

        if let Err(e) = check_script(&stage.script) {
            error!("Job script for {job_name} not found at {:?}", stage.script);
            return Err(e);
        }

        fs::create_dir_all(&self.logs_dir).map_err(|source| SubmissionError::LogDirectory {
            path: self.logs_dir.clone(),
            source,
        })?;

        let submission = JobArraySubmission {
            log_path: log_pattern(&self.logs_dir, &job_name),
            job_name,
            index_range: index_range.clone(),
            concurrency: stage.concurrency,
            dependency,
            script: stage.script.clone(),
            walltime: stage.walltime,
        };

        match self.scheduler.submit(&submission) {
            Ok(receipt) => {
                info!(
                    job_id = ?receipt.job_id,
                    elements = submission.index_range.len(),
                    dependency = ?submission.dependency.as_ref().map(ToString::to_string),
                    "Accepted {}",
                    submission.array_spec()
                );

                Ok(receipt)
            }
            Err(source) => Err(SubmissionError::SubmissionFailed {
                job_name: submission.job_name,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DependencyCondition, scheduler::testing::RecordingScheduler};

    fn stage(script: PathBuf, concurrency: u32) -> StageConfig {
        StageConfig {
            script,
            concurrency,
            walltime: None,
        }
    }

    #[test]
    fn builds_submission() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.bsub");
        fs::write(&script, "true\n").unwrap();
        let logs = dir.path().join("logs");
        let mut submitter = ArraySubmitter::new(RecordingScheduler::default(), &logs);

        let receipt = submitter
            .submit(
                "exp1",
                "pp",
                &stage(script.clone(), 4),
                &IndexRange::parse("1-10").unwrap(),
                Some(Dependency {
                    job_name: "exp1_run".to_string(),
                    condition: DependencyCondition::Done,
                }),
            )
            .unwrap();

        assert_eq!(receipt.job_name, "exp1_pp");
        assert!(logs.is_dir());

        let submission = &submitter.scheduler().submissions[0];
        assert_eq!(submission.array_spec(), "exp1_pp[1-10]%4");
        assert_eq!(submission.log_path, logs.join("exp1_pp.%I.log"));
        assert_eq!(submission.script, script);
        assert_eq!(
            submission.dependency.as_ref().unwrap().to_string(),
            "done(exp1_run[*])"
        );
    }

    #[test]
    fn missing_script_never_reaches_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let mut submitter = ArraySubmitter::new(RecordingScheduler::default(), dir.path());

        let result = submitter.submit(
            "exp1",
            "run",
            &stage(dir.path().join("run.bsub"), 4),
            &IndexRange::parse("1").unwrap(),
            None,
        );

        assert!(matches!(result, Err(SubmissionError::MissingScript(_))));
        assert!(submitter.scheduler().submissions.is_empty());
    }

    #[test]
    fn directory_is_not_a_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut submitter = ArraySubmitter::new(RecordingScheduler::default(), dir.path());

        let result = submitter.submit(
            "exp1",
            "run",
            &stage(dir.path().to_path_buf(), 4),
            &IndexRange::parse("1").unwrap(),
            None,
        );

        assert!(matches!(result, Err(SubmissionError::MissingScript(_))));
    }

    #[test]
    fn rejection_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.bsub");
        fs::write(&script, "true\n").unwrap();
        let mut submitter = ArraySubmitter::new(RecordingScheduler::rejecting(0), dir.path());

        let result = submitter.submit(
            "exp1",
            "run",
            &stage(script, 4),
            &IndexRange::parse("1-3").unwrap(),
            None,
        );

        assert!(matches!(
            result,
            Err(SubmissionError::SubmissionFailed { ref job_name, .. }) if job_name == "exp1_run"
        ));
        // exactly one attempt
        assert_eq!(submitter.scheduler().submissions.len(), 1);
    }

    #[test]
    fn invalid_names_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.bsub");
        fs::write(&script, "true\n").unwrap();
        let mut submitter = ArraySubmitter::new(RecordingScheduler::default(), dir.path());
        let range = IndexRange::parse("1").unwrap();

        assert!(matches!(
            submitter.submit("exp 1", "run", &stage(script.clone(), 1), &range, None),
            Err(SubmissionError::InvalidName(_))
        ));
        assert!(matches!(
            submitter.submit("exp1", "run", &stage(script, 0), &range, None),
            Err(SubmissionError::InvalidConcurrency(_))
        ));
        assert!(submitter.scheduler().submissions.is_empty());
    }
}
