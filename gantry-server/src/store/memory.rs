//! In-memory pipeline store
//!
//! Test double for [`PipelineStore`]. Backed by a plain mutex; good
//! enough for exercising the scheduler, worker, and HTTP handlers
//! without a database.

use std::sync::Mutex;

use async_trait::async_trait;

use gantry_core::domain::log::{NewStepLog, StepLog};
use gantry_core::domain::pipeline::{Pipeline, PipelineInfo, PipelineStatus};

use crate::store::{PipelineStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pipelines: Vec<Pipeline>,
    logs: Vec<StepLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn create_if_absent(
        &self,
        repository: &str,
        branch: &str,
        commit: &str,
    ) -> Result<(i64, bool), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner
            .pipelines
            .iter()
            .find(|p| p.repository == repository && p.branch == branch && p.commit == commit)
        {
            return Ok((existing.id, true));
        }

        let id = inner.pipelines.len() as i64 + 1;
        inner.pipelines.push(Pipeline {
            id,
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit: commit.to_string(),
            status: PipelineStatus::Waiting,
            created_at: chrono::Utc::now(),
        });

        Ok((id, false))
    }

    async fn get_status(&self, id: i64) -> Result<PipelineStatus, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .pipelines
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.status)
            .ok_or(StoreError::NotFound)
    }

    async fn get_logs(&self, id: i64) -> Result<Vec<StepLog>, StoreError> {
        let inner = self.inner.lock().unwrap();

        if !inner.pipelines.iter().any(|p| p.id == id) {
            return Err(StoreError::NotFound);
        }

        let mut logs: Vec<StepLog> = inner
            .logs
            .iter()
            .filter(|l| l.pipeline_id == id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.sequence);

        Ok(logs)
    }

    async fn get_oldest_waiting(&self) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pipelines
            .iter()
            .filter(|p| p.status == PipelineStatus::Waiting)
            .min_by_key(|p| (p.created_at, p.id))
            .map(|p| p.id))
    }

    async fn claim(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.pipelines.iter_mut().find(|p| p.id == id) {
            Some(p) if p.status == PipelineStatus::Waiting => {
                p.status = PipelineStatus::Running;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(&self, id: i64, status: PipelineStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let pipeline = inner
            .pipelines
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        pipeline.status = status;
        Ok(())
    }

    async fn get_pipeline_info(&self, id: i64) -> Result<PipelineInfo, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .pipelines
            .iter()
            .find(|p| p.id == id)
            .map(|p| PipelineInfo {
                repository: p.repository.clone(),
                branch: p.branch.clone(),
                commit: p.commit.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn append_log(&self, entry: NewStepLog) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.logs.len() as i64 + 1;
        inner.logs.push(StepLog {
            id,
            pipeline_id: entry.pipeline_id,
            sequence: entry.sequence,
            command_name: entry.command_name,
            command: entry.command,
            output: entry.output,
            status: entry.status,
        });
        Ok(())
    }
}
