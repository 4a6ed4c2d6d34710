//! Wire contract for the Flux Studio serverless endpoint
//!
//! This crate contains the data transfer objects exchanged with the remote
//! job queue, organized by domain:
//! - `job`: job requests, results, and lifecycle status
//! - `health`: endpoint health / worker diagnostics

pub mod health;
pub mod job;

pub use health::*;
pub use job::*;
