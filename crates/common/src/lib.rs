#![deny(missing_docs)]

//! Shared configuration, error types, and IDs for FlowBatch crates.
//!
//! Architecture role:
//! - defines scheduler configuration passed across layers
//! - provides common [`FbError`] / [`Result`] contracts
//! - hosts strongly-typed identifier wrappers
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

/// Shared scheduler configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;

pub use config::SchedulerConfig;
pub use error::{FbError, Result};
pub use ids::*;
