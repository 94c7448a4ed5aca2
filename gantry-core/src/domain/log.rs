//! Step log domain types

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Persisted record of one executed step.
///
/// Sequence numbers are 1-based and count execution order across job
/// boundaries. For a given pipeline they are strictly increasing and
/// contiguous for the steps that actually ran: execution halts at the
/// first failing step, so entries after a failure never exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLog {
    pub id: i64,
    pub pipeline_id: i64,
    pub sequence: i32,
    /// `job-name:step-name`
    pub command_name: String,
    pub command: String,
    pub output: String,
    pub status: StepStatus,
}

/// A step log as handed to the store, before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewStepLog {
    pub pipeline_id: i64,
    pub sequence: i32,
    pub command_name: String,
    pub command: String,
    pub output: String,
    pub status: StepStatus,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed { exit_code: i64 },
}

impl StepStatus {
    pub fn succeeded(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => f.write_str("succeeded"),
            StepStatus::Failed { exit_code } => write!(f, "failed (exit code {exit_code})"),
        }
    }
}

/// Error returned when a status string does not describe a step outcome.
#[derive(Debug, Error)]
#[error("unknown step status `{0}`")]
pub struct ParseStepStatusError(pub String);

impl FromStr for StepStatus {
    type Err = ParseStepStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "succeeded" {
            return Ok(StepStatus::Succeeded);
        }
        if let Some(code) = s
            .strip_prefix("failed (exit code ")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|code| code.parse::<i64>().ok())
        {
            return Ok(StepStatus::Failed { exit_code: code });
        }
        Err(ParseStepStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_status_renders_exit_code() {
        assert_eq!(StepStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(
            StepStatus::Failed { exit_code: 127 }.to_string(),
            "failed (exit code 127)"
        );
    }

    #[test]
    fn step_status_round_trips() {
        for status in [
            StepStatus::Succeeded,
            StepStatus::Failed { exit_code: 1 },
            StepStatus::Failed { exit_code: -1 },
        ] {
            assert_eq!(status.to_string().parse::<StepStatus>().unwrap(), status);
        }
    }

    #[test]
    fn garbage_step_status_is_rejected() {
        assert!("failed".parse::<StepStatus>().is_err());
        assert!("failed (exit code x)".parse::<StepStatus>().is_err());
    }
}
