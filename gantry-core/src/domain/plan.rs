//! Execution plan types
//!
//! Transient entities produced by the CI config parser for a single run.
//! They are never persisted; the worker walks them in order and records a
//! step log per executed step.

use serde::{Deserialize, Serialize};

/// A named, ordered group of steps.
///
/// Order within `steps` — and the order of jobs relative to each other —
/// equals declaration order in the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub steps: Vec<Step>,
}

/// A single named shell command within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub run: String,
}
