//! # ferry-core
//!
//! Core types, ID prefixes, and error types for Ferry.
//!
//! This crate provides the foundational types shared across all Ferry crates:
//! - Entity structs for environments, jobs, runs, row outcomes, and retry batches
//! - Status enums with state machine transitions
//! - Column mappings with a closed set of named transform kinds
//! - Raw and transformed row shapes exchanged between pipeline stages
//! - Progress arithmetic (percent complete, rate estimate)
//! - Cross-cutting error types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod mapping;
pub mod progress;
pub mod row;
