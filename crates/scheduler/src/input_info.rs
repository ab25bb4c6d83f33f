//! Per-subtask input assignment materialization.
//!
//! Contract:
//! - one [`ExecutionVertexInputInfo`] per downstream subtask per consumed
//!   result;
//! - non-broadcast all-to-all subpartition ranges partition `[0, S-1]`;
//! - broadcast inputs always map to subpartition range `[0, 0]`;
//! - pointwise inputs split partitions evenly across subtasks, then split
//!   subpartitions evenly among the subtasks sharing one partition.

use std::collections::HashMap;

use fb_common::{FbError, Result, ResultId};
use serde::{Deserialize, Serialize};

use crate::ranges::IndexRange;
use crate::result_info::BlockingResultInfo;

/// Input ranges consumed by one downstream subtask from one upstream result.
///
/// The subtask reads the Cartesian product of the two ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionVertexInputInfo {
    /// Downstream subtask index.
    pub subtask_index: usize,
    /// Consumed upstream partition range.
    pub partition_range: IndexRange,
    /// Consumed subpartition range within each partition.
    pub subpartition_range: IndexRange,
}

/// Per-subtask input assignments for one consumed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobVertexInputInfo {
    /// One entry per downstream subtask, ordered by subtask index.
    pub execution_vertex_input_infos: Vec<ExecutionVertexInputInfo>,
}

/// Decided parallelism plus the input assignment for every consumed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelismAndInputInfos {
    /// Number of downstream subtasks to create.
    pub parallelism: usize,
    /// Input assignment per consumed upstream result.
    pub input_infos: HashMap<ResultId, JobVertexInputInfo>,
}

/// Evenly assign subpartition indexes across `parallelism` consumers for
/// every consumed result.
///
/// The first computation wins when two results share an id.
pub fn compute_vertex_input_infos(
    parallelism: usize,
    consumed_results: &[BlockingResultInfo],
) -> Result<HashMap<ResultId, JobVertexInputInfo>> {
    let mut input_infos = HashMap::with_capacity(consumed_results.len());
    for info in consumed_results {
        let computed = if info.is_pointwise() {
            compute_pointwise_input_info(
                parallelism,
                info.num_partitions(),
                info.num_subpartitions(0),
            )?
        } else {
            compute_all_to_all_input_info(
                parallelism,
                info.num_partitions(),
                info.num_subpartitions(0),
                info.is_broadcast(),
            )?
        };
        input_infos.entry(info.result_id()).or_insert(computed);
    }
    Ok(input_infos)
}

fn compute_all_to_all_input_info(
    parallelism: usize,
    num_partitions: usize,
    num_subpartitions: usize,
    broadcast: bool,
) -> Result<JobVertexInputInfo> {
    let partition_range = IndexRange::new(0, num_partitions - 1);
    let mut execution_vertex_input_infos = Vec::with_capacity(parallelism);
    for subtask_index in 0..parallelism {
        let subpartition_range = consumed_subpartition_range(
            subtask_index,
            parallelism,
            num_subpartitions,
            broadcast,
        )?;
        execution_vertex_input_infos.push(ExecutionVertexInputInfo {
            subtask_index,
            partition_range,
            subpartition_range,
        });
    }
    Ok(JobVertexInputInfo {
        execution_vertex_input_infos,
    })
}

fn compute_pointwise_input_info(
    parallelism: usize,
    num_partitions: usize,
    num_subpartitions: usize,
) -> Result<JobVertexInputInfo> {
    let mut execution_vertex_input_infos = Vec::with_capacity(parallelism);
    if num_partitions >= parallelism {
        // each subtask reads a contiguous partition group in full
        for subtask_index in 0..parallelism {
            let start = subtask_index * num_partitions / parallelism;
            let end = (subtask_index + 1) * num_partitions / parallelism;
            let subpartition_range =
                consumed_subpartition_range(subtask_index, 1, num_subpartitions, false)?;
            execution_vertex_input_infos.push(ExecutionVertexInputInfo {
                subtask_index,
                partition_range: IndexRange::new(start, end - 1),
                subpartition_range,
            });
        }
    } else {
        // each partition is shared by a contiguous consumer group that
        // splits its subpartitions evenly
        for partition_index in 0..num_partitions {
            let start = (partition_index * parallelism).div_ceil(num_partitions);
            let end = ((partition_index + 1) * parallelism).div_ceil(num_partitions);
            let num_consumers = end - start;
            for subtask_index in start..end {
                let subpartition_range = consumed_subpartition_range(
                    subtask_index,
                    num_consumers,
                    num_subpartitions,
                    false,
                )?;
                execution_vertex_input_infos.push(ExecutionVertexInputInfo {
                    subtask_index,
                    partition_range: IndexRange::new(partition_index, partition_index),
                    subpartition_range,
                });
            }
        }
    }
    Ok(JobVertexInputInfo {
        execution_vertex_input_infos,
    })
}

fn consumed_subpartition_range(
    consumer_subtask_index: usize,
    num_consumers: usize,
    num_subpartitions: usize,
    broadcast: bool,
) -> Result<IndexRange> {
    let consumer_index = consumer_subtask_index % num_consumers;
    if broadcast {
        if num_subpartitions != 1 {
            return Err(FbError::InvalidState(format!(
                "broadcast results must have a single subpartition, got {num_subpartitions}"
            )));
        }
        return Ok(IndexRange::new(0, 0));
    }
    if num_consumers > num_subpartitions {
        return Err(FbError::InvalidArgument(format!(
            "{num_consumers} consumers cannot split {num_subpartitions} subpartitions"
        )));
    }
    let start = consumer_index * num_subpartitions / num_consumers;
    let next_start = (consumer_index + 1) * num_subpartitions / num_consumers;
    Ok(IndexRange::new(start, next_start - 1))
}
