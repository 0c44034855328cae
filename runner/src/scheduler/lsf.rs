use super::{JobArraySubmission, Scheduler, SchedulerError, SubmissionReceipt};
use crate::config::SchedulerConfig;
use std::{
    fs::File,
    process::{Command, Stdio},
};
use tracing::{debug, error, info, instrument};

/// Submits array jobs through LSF's `bsub`, feeding the job script on stdin
#[derive(Debug, Clone)]
pub struct LsfScheduler {
    // program followed by leading arguments, e.g. `bsub` or `ssh login1 bsub`
    command: Vec<String>,
    queue: Option<String>,
}

impl LsfScheduler {
    pub fn load(config: &SchedulerConfig) -> Self {
        Self {
            command: config
                .command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            queue: config.queue.clone(),
        }
    }

    /// submission options for `bsub`
    pub fn arguments(&self, submission: &JobArraySubmission) -> Vec<String> {
        let log_path = submission.log_path.to_string_lossy().into_owned();
        let mut arguments = vec![
            "-J".to_string(),
            submission.array_spec(),
            "-o".to_string(),
            log_path.clone(),
            "-e".to_string(),
            log_path,
        ];

        if let Some(queue) = &self.queue {
            arguments.extend(["-q".to_string(), queue.clone()]);
        }

        if let Some(walltime) = &submission.walltime {
            arguments.extend(["-W".to_string(), walltime.to_string()]);
        }

        if let Some(dependency) = &submission.dependency {
            // -ti terminates waiting elements as soon as the dependency can never be met
            arguments.extend(["-w".to_string(), dependency.to_string(), "-ti".to_string()]);
        }

        arguments
    }

    /// full command line in shell notation, used for logging and dry runs
    pub fn render(&self, submission: &JobArraySubmission) -> String {
        let mut words = self.command.clone();
        words.extend(self.arguments(submission));

        format!(
            "{} < {}",
            words.iter().map(|word| shell_quote(word)).collect::<Vec<_>>().join(" "),
            shell_quote(&submission.script.to_string_lossy())
        )
    }
}

impl Scheduler for LsfScheduler {
    #[instrument(level = "debug", skip(self, submission), fields(job = %submission.job_name))]
    fn submit(
        &mut self,
        submission: &JobArraySubmission,
    ) -> Result<SubmissionReceipt, SchedulerError> {
        let rendered = self.render(submission);
        let (program, leading) =
            self.command
                .split_first()
                .ok_or_else(|| SchedulerError::Spawn {
                    command: rendered.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty submission command",
                    ),
                })?;

        let script = File::open(&submission.script).map_err(|source| SchedulerError::Script {
            path: submission.script.clone(),
            source,
        })?;

        debug!("Submitting: {rendered}");

        let output = Command::new(program)
            .args(leading)
            .args(self.arguments(submission))
            .stdin(Stdio::from(script))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| SchedulerError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                status = ?output.status.code(),
                stderr = %stderr,
                "Submission of {} failed",
                submission.job_name
            );

            return Err(SchedulerError::Rejected {
                status: output.status.code(),
                stderr,
            });
        }

        let job_id = parse_job_id(&stdout);
        info!(job_id = ?job_id, "Submitted {}", submission.array_spec());

        Ok(SubmissionReceipt {
            job_name: submission.job_name.clone(),
            job_id,
        })
    }
}

/// extract the id from `Job <1234> is submitted to queue <normal>.`
pub fn parse_job_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Job <")?;
        let (id, _) = rest.split_once('>')?;

        (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
    })
}

fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
