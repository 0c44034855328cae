use crate::{
    array_spec::{IndexRange, RangeError},
    config::{
        is_valid_name, ConfigErrors, RunnerConfig, STAGE_CLEANUP, STAGE_POST_PROCESS, STAGE_RUN,
    },
    scheduler::{Dependency, Scheduler, SubmissionReceipt},
    submitter::{check_script, ArraySubmitter, SubmissionError},
};
use clap::ValueEnum;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("{0}")]
    BadArgument(String),
    #[error("Invalid index range: {0}")]
    BadRange(#[from] RangeError),
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Prerequisite job script {script:?} of stage {stage} is missing")]
    MissingPrerequisite { stage: String, script: PathBuf },
    #[error("Launch failed, primary stage was not submitted")]
    PrimaryFailed(#[source] SubmissionError),
    /// the primary array job stays queued, nothing is rolled back
    #[error("Launch failed, dependent stage was not submitted but {} remains queued", .primary.job_name)]
    DependentFailed {
        primary: SubmissionReceipt,
        #[source]
        source: SubmissionError,
    },
}

/// Which stages a launch submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Pipeline {
    /// model run followed by post-processing once the whole run array has finished
    #[default]
    RunPp,
    /// model run only
    Run,
    /// post-processing only
    Pp,
    /// tile cleanup only
    Cleanup,
}

impl Pipeline {
    /// (primary stage, dependent stage)
    pub fn stages(&self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::RunPp => (STAGE_RUN, Some(STAGE_POST_PROCESS)),
            Self::Run => (STAGE_RUN, None),
            Self::Pp => (STAGE_POST_PROCESS, None),
            Self::Cleanup => (STAGE_CLEANUP, None),
        }
    }
}

/// Validated launcher arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub job_base_name: String,
    pub index_range: IndexRange,
}

impl LaunchRequest {
    pub fn new(job_base_name: &str, index_range: &str) -> Result<Self, LaunchError> {
        if !is_valid_name(job_base_name) {
            return Err(LaunchError::BadArgument(format!(
                "'{job_base_name}' is not a valid job name, use letters, digits, '.', '-' and '_'"
            )));
        }

        Ok(Self {
            job_base_name: job_base_name.to_string(),
            index_range: IndexRange::parse(index_range)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub primary: SubmissionReceipt,
    pub dependent: Option<SubmissionReceipt>,
}

/// Submits the primary array job and, for two stage pipelines, the dependent one
#[derive(Debug)]
pub struct Launcher<'c, S> {
    config: &'c RunnerConfig,
    submitter: ArraySubmitter<S>,
}

impl<'c, S: Scheduler> Launcher<'c, S> {
    pub fn new(config: &'c RunnerConfig, scheduler: S) -> Self {
        Self {
            config,
            submitter: ArraySubmitter::new(scheduler, &config.paths.logs),
        }
    }

    pub fn scheduler(&self) -> &S {
        self.submitter.scheduler()
    }

    /// stage config and script check for every stage before anything is submitted
    fn validate(&self, pipeline: Pipeline) -> Result<(), LaunchError> {
        let (primary, dependent) = pipeline.stages();

        for stage_name in std::iter::once(primary).chain(dependent) {
            let stage = self.config.stage(stage_name)?;

            if check_script(&stage.script).is_err() {
                error!("Job script {:?} for stage {stage_name} not found", stage.script);

                return Err(LaunchError::MissingPrerequisite {
                    stage: stage_name.to_string(),
                    script: stage.script.clone(),
                });
            }
        }

        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self, request), fields(job = %request.job_base_name, range = %request.index_range))]
    pub fn launch(
        &mut self,
        request: &LaunchRequest,
        pipeline: Pipeline,
    ) -> Result<LaunchReport, LaunchError> {
        self.validate(pipeline)?;

        let config = self.config;
        let (primary_stage, dependent_stage) = pipeline.stages();

        let primary = self
            .submitter
            .submit(
                &request.job_base_name,
                primary_stage,
                config.stage(primary_stage)?,
                &request.index_range,
                None,
            )
            .map_err(LaunchError::PrimaryFailed)?;

        let Some(dependent_stage) = dependent_stage else {
            info!("Submitted {}", primary.job_name);
            return Ok(LaunchReport {
                primary,
                dependent: None,
            });
        };

        // the dependent array waits for completion of the *whole* primary array
        let dependency = Dependency {
            job_name: primary.job_name.clone(),
            condition: config.scheduler.dependency,
        };

        match self.submitter.submit(
            &request.job_base_name,
            dependent_stage,
            config.stage(dependent_stage)?,
            &request.index_range,
            Some(dependency),
        ) {
            Ok(dependent) => {
                info!(
                    "Submitted {} and {} waiting on it",
                    primary.job_name, dependent.job_name
                );

                Ok(LaunchReport {
                    primary,
                    dependent: Some(dependent),
                })
            }
            Err(source) => {
                warn!(
                    job_id = ?primary.job_id,
                    "{} was accepted and stays queued without its dependent stage",
                    primary.job_name
                );

                Err(LaunchError::DependentFailed { primary, source })
            }
        }
    }
}
