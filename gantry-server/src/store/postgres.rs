//! Postgres pipeline store
//!
//! Production implementation of [`PipelineStore`] over a sqlx pool.
//! Schema lives in `db::run_migrations`.

use async_trait::async_trait;
use sqlx::PgPool;

use gantry_core::domain::log::{NewStepLog, StepLog, StepStatus};
use gantry_core::domain::pipeline::{PipelineInfo, PipelineStatus};

use crate::store::{PipelineStore, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn create_if_absent(
        &self,
        repository: &str,
        branch: &str,
        commit: &str,
    ) -> Result<(i64, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT pipeline_id
            FROM pipelines
            WHERE repository = $1 AND branch = $2 AND commit = $3
            "#,
        )
        .bind(repository)
        .bind(branch)
        .bind(commit)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((id,)) = existing {
            tx.commit().await?;
            return Ok((id, true));
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pipelines (status, repository, branch, commit)
            VALUES ($1, $2, $3, $4)
            RETURNING pipeline_id
            "#,
        )
        .bind(PipelineStatus::Waiting.as_str())
        .bind(repository)
        .bind(branch)
        .bind(commit)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((id, false))
    }

    async fn get_status(&self, id: i64) -> Result<PipelineStatus, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM pipelines WHERE pipeline_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let (status,) = row.ok_or(StoreError::NotFound)?;

        status
            .parse()
            .map_err(|_| StoreError::InvalidRow(format!("pipeline status `{status}`")))
    }

    async fn get_logs(&self, id: i64) -> Result<Vec<StepLog>, StoreError> {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT pipeline_id FROM pipelines WHERE pipeline_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let rows = sqlx::query_as::<_, StepLogRow>(
            r#"
            SELECT log_id, pipeline_id, command_number, command_name, command, output, final_status
            FROM step_logs
            WHERE pipeline_id = $1
            ORDER BY command_number ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepLog::try_from).collect()
    }

    async fn get_oldest_waiting(&self) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT pipeline_id
            FROM pipelines
            WHERE status = $1
            ORDER BY created_at ASC, pipeline_id ASC
            LIMIT 1
            "#,
        )
        .bind(PipelineStatus::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn claim(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $1
            WHERE pipeline_id = $2 AND status = $3
            "#,
        )
        .bind(PipelineStatus::Running.as_str())
        .bind(id)
        .bind(PipelineStatus::Waiting.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(&self, id: i64, status: PipelineStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE pipelines SET status = $1 WHERE pipeline_id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn get_pipeline_info(&self, id: i64) -> Result<PipelineInfo, StoreError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT repository, branch, commit FROM pipelines WHERE pipeline_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (repository, branch, commit) = row.ok_or(StoreError::NotFound)?;

        Ok(PipelineInfo {
            repository,
            branch,
            commit,
        })
    }

    async fn append_log(&self, entry: NewStepLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO step_logs (pipeline_id, command_number, command_name, command, output, final_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.pipeline_id)
        .bind(entry.sequence)
        .bind(&entry.command_name)
        .bind(&entry.command)
        .bind(&entry.output)
        .bind(entry.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepLogRow {
    log_id: i64,
    pipeline_id: i64,
    command_number: i32,
    command_name: String,
    command: String,
    output: String,
    final_status: String,
}

impl TryFrom<StepLogRow> for StepLog {
    type Error = StoreError;

    fn try_from(row: StepLogRow) -> Result<Self, StoreError> {
        let status: StepStatus = row
            .final_status
            .parse()
            .map_err(|_| StoreError::InvalidRow(format!("step status `{}`", row.final_status)))?;

        Ok(StepLog {
            id: row.log_id,
            pipeline_id: row.pipeline_id,
            sequence: row.command_number,
            command_name: row.command_name,
            command: row.command,
            output: row.output,
            status,
        })
    }
}
