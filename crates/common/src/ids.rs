//! Typed identifiers shared across scheduler components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable job vertex identifier within one job DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobVertexId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for JobVertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of one upstream intermediate dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
