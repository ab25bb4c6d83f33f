use thiserror::Error;

/// Canonical FlowBatch error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FbError::InvalidConfig`]: configuration contract violations caught at construction
/// - [`FbError::InvalidArgument`]: caller-supplied values outside the accepted domain
/// - [`FbError::InvalidState`]: upstream statistics or computed results violating internal invariants
#[derive(Debug, Error)]
pub enum FbError {
    /// Invalid or inconsistent configuration state.
    ///
    /// Examples:
    /// - non-positive minimum parallelism
    /// - maximum parallelism below the minimum parallelism
    /// - unparsable option values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller-supplied argument outside the accepted domain.
    ///
    /// Examples:
    /// - zero initial parallelism (neither unset nor positive)
    /// - consumer counts exceeding available subpartitions
    /// - partition indexes outside the declared partition count
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Upstream statistics or computed results violating internal invariants.
    ///
    /// Examples:
    /// - all-to-all inputs disagreeing on subpartition counts
    /// - querying aggregated bytes before all partitions reported
    /// - computed subpartition ranges failing the exact-coverage self-check
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Standard FlowBatch result alias.
pub type Result<T> = std::result::Result<T, FbError>;
