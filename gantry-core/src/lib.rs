//! Gantry Core
//!
//! Core types for the Gantry CI system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, StepLog, Job, Step)
//! - DTOs: Data transfer objects for the HTTP surface

pub mod domain;
pub mod dto;
