//! Gantry CI configuration
//!
//! This crate turns a raw CI configuration document into an ordered
//! execution plan for the worker. It exists as its own member because the
//! configuration format is a contract with repositories, independent of
//! how the server schedules or persists anything.

pub mod error;
pub mod parser;

pub use error::ConfigError;
pub use parser::parse_jobs;

pub use gantry_core::domain::plan::{Job, Step};
