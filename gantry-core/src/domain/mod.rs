//! Core domain types
//!
//! The fundamental business entities of Gantry, shared between the
//! HTTP surface (which reports them) and the worker (which produces them).

pub mod log;
pub mod pipeline;
pub mod plan;
