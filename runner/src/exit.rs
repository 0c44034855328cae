use crate::{
    cleaner::CleanError, collect::CollectError, config::ConfigErrors, context::ContextError,
    element::ElementError, launcher::LaunchError, materialize::MaterializeError,
    submitter::SubmissionError,
};
use std::process::ExitCode;

pub const E_OK: u8 = 0;
pub const E_IO: u8 = 1;
/// missing or malformed arguments, same code clap uses for usage errors
pub const E_BADARG: u8 = 2;
/// prerequisite job script missing
pub const E_BADJOB: u8 = 3;
pub const E_SUBMIT: u8 = 4;
/// array index variable absent or invalid at element execution time
pub const E_NOINDEX: u8 = 5;
pub const E_CONFIG: u8 = 6;

/// Maps an error onto the process exit status reported to the calling shell
pub trait ExitStatus {
    fn exit_status(&self) -> u8;

    fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

impl ExitStatus for ConfigErrors {
    fn exit_status(&self) -> u8 {
        E_CONFIG
    }
}

impl ExitStatus for ContextError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::Argument(_) => E_BADARG,
            Self::Missing { .. } | Self::Unparsable { .. } | Self::Index(_) => E_NOINDEX,
        }
    }
}

impl ExitStatus for MaterializeError {
    fn exit_status(&self) -> u8 {
        E_CONFIG
    }
}

impl ExitStatus for CleanError {
    fn exit_status(&self) -> u8 {
        E_IO
    }
}

impl ExitStatus for CollectError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::Index(_) => E_BADARG,
            Self::Log { .. } => E_IO,
        }
    }
}

impl ExitStatus for SubmissionError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::MissingScript(_) => E_BADJOB,
            Self::InvalidName(_) | Self::InvalidConcurrency(_) => E_BADARG,
            Self::LogDirectory { .. } => E_IO,
            Self::SubmissionFailed { .. } => E_SUBMIT,
        }
    }
}

impl ExitStatus for LaunchError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::BadArgument(_) | Self::BadRange(_) => E_BADARG,
            Self::Config(e) => e.exit_status(),
            Self::MissingPrerequisite { .. } => E_BADJOB,
            Self::PrimaryFailed(e) | Self::DependentFailed { source: e, .. } => e.exit_status(),
        }
    }
}

impl ExitStatus for ElementError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::InvalidStage(_) => E_BADARG,
            Self::Context(e) => e.exit_status(),
            Self::Materialize(e) => e.exit_status(),
            Self::Log { .. } | Self::Spawn { .. } | Self::Failed { .. } => E_IO,
        }
    }
}
