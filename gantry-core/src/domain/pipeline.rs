//! Pipeline domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One execution attempt of a repository/branch/commit triple.
///
/// The id is assigned by the store on creation. The triple is unique among
/// stored pipelines: a duplicate submission resolves to the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub repository: String,
    pub branch: String,
    pub commit: String,
    pub status: PipelineStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The checkout target of a pipeline, as handed to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub repository: String,
    pub branch: String,
    pub commit: String,
}

/// Pipeline execution status.
///
/// `waiting` -> `running` -> exactly one of `completed`, `failed`,
/// `aborted`. No transition ever leaves a terminal state. The lowercase
/// strings are the exact values exposed to clients and stored in rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Waiting,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Waiting => "waiting",
            PipelineStatus::Running => "running",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Aborted
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string does not name a known status.
#[derive(Debug, Error)]
#[error("unknown pipeline status `{0}`")]
pub struct ParsePipelineStatusError(pub String);

impl FromStr for PipelineStatus {
    type Err = ParsePipelineStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(PipelineStatus::Waiting),
            "running" => Ok(PipelineStatus::Running),
            "completed" => Ok(PipelineStatus::Completed),
            "failed" => Ok(PipelineStatus::Failed),
            "aborted" => Ok(PipelineStatus::Aborted),
            other => Err(ParsePipelineStatusError(other.to_string())),
        }
    }
}
