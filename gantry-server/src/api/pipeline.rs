//! Pipeline API Handlers
//!
//! HTTP endpoints for submitting pipelines and polling their progress.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gantry_core::dto::log::StepLogDto;
use gantry_core::dto::pipeline::{
    PipelineStatusResponse, RunPipelineRequest, RunPipelineResponse,
};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::store::StoreError;

/// POST /run-pipeline
///
/// Submitting the same repository/branch/commit triple twice is not an
/// error: the second call resolves to the existing pipeline and answers
/// 200 where a fresh submission answers 201.
pub async fn run_pipeline(
    State(state): State<AppState>,
    Json(req): Json<RunPipelineRequest>,
) -> ApiResult<(StatusCode, Json<RunPipelineResponse>)> {
    validate_run_request(&req)?;

    tracing::info!(
        "pipeline submitted: {} {} {}",
        req.repository_url,
        req.branch,
        req.commit
    );

    let (pipeline_id, already_existed) = state
        .store
        .create_if_absent(&req.repository_url, &req.branch, &req.commit)
        .await
        .map_err(ApiError::Store)?;

    let status = if already_existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(RunPipelineResponse { pipeline_id })))
}

/// GET /pipeline/{id}/status
pub async fn pipeline_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PipelineStatusResponse>> {
    let status = state.store.get_status(id).await.map_err(|e| match e {
        StoreError::NotFound => {
            ApiError::NotFound("pipeline with such id doesn't exist".to_string())
        }
        other => ApiError::Store(other),
    })?;

    Ok(Json(PipelineStatusResponse {
        pipeline_id: id,
        status,
    }))
}

/// GET /pipeline/{id}/logs
pub async fn pipeline_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<StepLogDto>>> {
    let logs = state.store.get_logs(id).await.map_err(|e| match e {
        StoreError::NotFound => {
            ApiError::NotFound("pipeline with such id doesn't exist".to_string())
        }
        other => ApiError::Store(other),
    })?;

    Ok(Json(logs.into_iter().map(StepLogDto::from).collect()))
}

fn validate_run_request(req: &RunPipelineRequest) -> ApiResult<()> {
    if req.repository_url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "repository_url cannot be empty".to_string(),
        ));
    }

    if req.branch.trim().is_empty() {
        return Err(ApiError::BadRequest("branch cannot be empty".to_string()));
    }

    if req.commit.trim().is_empty() {
        return Err(ApiError::BadRequest("commit cannot be empty".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gantry_core::domain::log::{NewStepLog, StepStatus};
    use gantry_core::domain::pipeline::PipelineStatus;

    use super::*;
    use crate::store::{MemoryStore, PipelineStore};

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn request() -> RunPipelineRequest {
        RunPipelineRequest {
            repository_url: "https://example.com/repo.git".to_string(),
            branch: "main".to_string(),
            commit: "abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_submission_is_distinguishable() {
        let state = state();

        let (code, Json(first)) = run_pipeline(State(state.clone()), Json(request()))
            .await
            .unwrap();
        assert_eq!(code, StatusCode::CREATED);

        let (code, Json(second)) = run_pipeline(State(state.clone()), Json(request()))
            .await
            .unwrap();
        assert_eq!(code, StatusCode::OK);
        assert_eq!(first.pipeline_id, second.pipeline_id);
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let mut req = request();
        req.branch = "  ".to_string();

        let result = run_pipeline(State(state()), Json(req)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn status_of_unknown_pipeline_is_not_found() {
        let result = pipeline_status(State(state()), Path(99)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn status_reports_the_stored_value() {
        let state = state();
        let (_, Json(created)) = run_pipeline(State(state.clone()), Json(request()))
            .await
            .unwrap();

        let Json(response) = pipeline_status(State(state.clone()), Path(created.pipeline_id))
            .await
            .unwrap();
        assert_eq!(response.status, PipelineStatus::Waiting);
    }

    #[tokio::test]
    async fn logs_come_back_in_sequence_order() {
        let state = state();
        let (_, Json(created)) = run_pipeline(State(state.clone()), Json(request()))
            .await
            .unwrap();

        for sequence in 1..=2 {
            state
                .store
                .append_log(NewStepLog {
                    pipeline_id: created.pipeline_id,
                    sequence,
                    command_name: format!("build:step-{sequence}"),
                    command: "make".to_string(),
                    output: String::new(),
                    status: StepStatus::Succeeded,
                })
                .await
                .unwrap();
        }

        let Json(logs) = pipeline_logs(State(state.clone()), Path(created.pipeline_id))
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].sequence, 1);
        assert_eq!(logs[0].status, "succeeded");
        assert_eq!(logs[1].command_name, "build:step-2");
    }

    #[tokio::test]
    async fn logs_of_unknown_pipeline_are_not_found() {
        let result = pipeline_logs(State(state()), Path(99)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}