//! Adaptive batch parallelism decision core.
//!
//! Architecture role:
//! - consumes finalized per-partition byte statistics of upstream blocking
//!   results
//! - decides downstream vertex parallelism within the configured window
//! - materializes per-subtask (partition range, subpartition range) input
//!   assignments
//!
//! Key modules:
//! - [`decider`]
//! - [`ranges`]
//! - [`bisection`]
//! - [`result_info`]
//! - [`input_info`]

pub mod bisection;
pub mod decider;
pub mod input_info;
pub mod ranges;
pub mod result_info;

pub use decider::ParallelismDecider;
pub use input_info::{ExecutionVertexInputInfo, JobVertexInputInfo, ParallelismAndInputInfos};
pub use ranges::IndexRange;
pub use result_info::BlockingResultInfo;
