use crate::timing::{compute_start_time, IndexError, StartTime};
use std::env;
use thiserror::Error;

/// index variable set by LSF for each element of an array job
pub const DEFAULT_INDEX_VARIABLE: &str = "LSB_JOBINDEX";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("{variable} is not set, this must run as an element of an array job")]
    Missing { variable: String },
    #[error("{variable}={value} is not an integer array index")]
    Unparsable { variable: String, value: String },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Invalid --index argument")]
    Argument(#[source] IndexError),
}

/// Per-element execution context.
///
/// Everything that runs once per array element receives its index through
/// this value instead of reading the process environment on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    index: i64,
    start_time: StartTime,
}

impl ExecutionContext {
    /// build a context from an explicit index, rejecting indices below 1
    pub fn new(index: i64) -> Result<Self, ContextError> {
        let start_time = compute_start_time(index).map_err(ContextError::Argument)?;

        Ok(Self { index, start_time })
    }

    /// resolve the context from the scheduler provided environment variable
    pub fn from_env(variable: &str) -> Result<Self, ContextError> {
        Self::from_lookup(variable, |name| env::var(name).ok())
    }

    pub fn from_lookup<F>(variable: &str, lookup: F) -> Result<Self, ContextError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let value = lookup(variable)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ContextError::Missing {
                variable: variable.to_string(),
            })?;

        let index = value
            .trim()
            .parse::<i64>()
            .map_err(|_| ContextError::Unparsable {
                variable: variable.to_string(),
                value: value.clone(),
            })?;
        let start_time = compute_start_time(index)?;

        Ok(Self { index, start_time })
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn start_time(&self) -> StartTime {
        self.start_time
    }
}
