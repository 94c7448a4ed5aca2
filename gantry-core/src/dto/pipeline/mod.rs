//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::PipelineStatus;

/// Request to run a pipeline for a repository/branch/commit triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPipelineRequest {
    pub repository_url: String,
    pub branch: String,
    pub commit: String,
}

/// Response to a run request
///
/// Returned for fresh and duplicate submissions alike; the HTTP status
/// code distinguishes the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPipelineResponse {
    pub pipeline_id: i64,
}

/// Response to a status poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatusResponse {
    pub pipeline_id: i64,
    pub status: PipelineStatus,
}
