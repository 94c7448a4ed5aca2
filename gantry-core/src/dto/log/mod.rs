//! Step log DTOs

use serde::{Deserialize, Serialize};

use crate::domain::log::StepLog;

/// One executed step as reported to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLogDto {
    pub id: i64,
    pub sequence: i32,
    pub command_name: String,
    pub command: String,
    pub output: String,
    pub status: String,
}

impl From<StepLog> for StepLogDto {
    fn from(log: StepLog) -> Self {
        StepLogDto {
            id: log.id,
            sequence: log.sequence,
            command_name: log.command_name,
            command: log.command,
            output: log.output,
            status: log.status.to_string(),
        }
    }
}
