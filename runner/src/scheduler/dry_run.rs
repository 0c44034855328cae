use super::{lsf::LsfScheduler, JobArraySubmission, Scheduler, SchedulerError, SubmissionReceipt};
use crate::config::SchedulerConfig;
use tracing::info;

/// Prints the submission commands instead of running them
#[derive(Debug, Clone)]
pub struct DryRunScheduler {
    lsf: LsfScheduler,
    pub rendered: Vec<String>,
}

impl DryRunScheduler {
    pub fn load(config: &SchedulerConfig) -> Self {
        Self {
            lsf: LsfScheduler::load(config),
            rendered: Vec::new(),
        }
    }
}

impl Scheduler for DryRunScheduler {
    fn submit(
        &mut self,
        submission: &JobArraySubmission,
    ) -> Result<SubmissionReceipt, SchedulerError> {
        let rendered = self.lsf.render(submission);
        info!("Dry run, not submitting {}", submission.job_name);
        println!("{rendered}");
        self.rendered.push(rendered);

        Ok(SubmissionReceipt {
            job_name: submission.job_name.clone(),
            job_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_spec::IndexRange;
    use std::path::PathBuf;

    #[test]
    fn renders_without_submitting() {
        let mut scheduler = DryRunScheduler::load(&SchedulerConfig::default());
        let submission = JobArraySubmission {
            job_name: "exp1_run".to_string(),
            index_range: IndexRange::parse("1-4").unwrap(),
            concurrency: 2,
            dependency: None,
            log_path: PathBuf::from("logs/exp1_run.%I.log"),
            // never opened in a dry run
            script: PathBuf::from("/nonexistent/run.bsub"),
            walltime: None,
        };

        let receipt = scheduler.submit(&submission).unwrap();

        assert_eq!(receipt.job_id, None);
        assert_eq!(
            scheduler.rendered,
            ["bsub -J 'exp1_run[1-4]%2' -o 'logs/exp1_run.%I.log' -e 'logs/exp1_run.%I.log' < /nonexistent/run.bsub"]
        );
    }
}
