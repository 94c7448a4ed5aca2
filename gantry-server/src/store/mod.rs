//! Pipeline store
//!
//! The persistence capability the scheduler, worker, and HTTP surface
//! share. Trait-based with one production implementation to keep the rest
//! of the server testable against an in-memory double.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;

use gantry_core::domain::log::{NewStepLog, StepLog};
use gantry_core::domain::pipeline::{PipelineInfo, PipelineStatus};

/// Errors that can occur when using the pipeline store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced pipeline does not exist
    #[error("not found")]
    NotFound,

    /// The underlying database failed
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A stored row carries data the domain cannot represent
    #[error("invalid row data: {0}")]
    InvalidRow(String),
}

/// Persistence operations the execution core requires
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Resolves a submission to a pipeline id, creating a `waiting` row
    /// only if no pipeline exists for the triple yet.
    ///
    /// Returns the id and whether the pipeline already existed. The
    /// check and the insert happen inside one transaction, so two
    /// concurrent submissions of the same triple resolve to one row.
    async fn create_if_absent(
        &self,
        repository: &str,
        branch: &str,
        commit: &str,
    ) -> Result<(i64, bool), StoreError>;

    async fn get_status(&self, id: i64) -> Result<PipelineStatus, StoreError>;

    /// All step logs of a pipeline in execution order
    async fn get_logs(&self, id: i64) -> Result<Vec<StepLog>, StoreError>;

    /// Id of the `waiting` pipeline with the earliest creation time
    async fn get_oldest_waiting(&self) -> Result<Option<i64>, StoreError>;

    /// Conditionally moves a pipeline from `waiting` to `running`.
    ///
    /// Returns false when the row is gone or was already moved past
    /// `waiting`. This is the sole race-prevention point between
    /// concurrent claims: at most one caller ever sees true per id.
    async fn claim(&self, id: i64) -> Result<bool, StoreError>;

    async fn update_status(&self, id: i64, status: PipelineStatus) -> Result<(), StoreError>;

    async fn get_pipeline_info(&self, id: i64) -> Result<PipelineInfo, StoreError>;

    async fn append_log(&self, entry: NewStepLog) -> Result<(), StoreError>;
}
