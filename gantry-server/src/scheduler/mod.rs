//! Scheduler layer
//!
//! Discovers waiting pipelines by polling the store and dispatches
//! workers under a fixed concurrency ceiling. Polling keeps the
//! scheduler stateless and crash-simple: on restart it resumes by asking
//! the store for work, with no in-memory queue to reconstruct.

pub mod poller;

pub use poller::Poller;
