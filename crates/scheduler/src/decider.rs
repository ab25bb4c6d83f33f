//! Adaptive parallelism decision for batch job vertices.
//!
//! Contract:
//! - vertices whose inputs are all all-to-all (and not all broadcast) get a
//!   byte-even split of subpartitions, with parallelism derived from the
//!   per-task data budget and coerced into the configured window;
//! - every other vertex gets a subpartition-count-even split, at either the
//!   user-fixed parallelism or a budget-derived one;
//! - broadcast bytes count against at most half of the per-task budget;
//! - decisions are pure functions of the inputs and the configuration
//!   snapshot taken at construction.

use std::collections::HashMap;

use fb_common::config::AVG_DATA_VOLUME_PER_TASK_KEY;
use fb_common::{FbError, JobVertexId, Result, SchedulerConfig};
use tracing::{debug, info};

use crate::bisection::{find_max_legal_value, find_min_legal_value};
use crate::input_info::{
    compute_vertex_input_infos, ExecutionVertexInputInfo, JobVertexInputInfo,
    ParallelismAndInputInfos,
};
use crate::ranges::{compute_range_count, compute_subpartition_ranges, IndexRange};
use crate::result_info::BlockingResultInfo;

/// Cap ratio of broadcast bytes to the per-task data volume budget.
///
/// Broadcast datasets are usually smaller than non-broadcast ones; capping
/// their share keeps small non-broadcast inputs from ballooning the decided
/// parallelism.
const BROADCAST_CAP_RATIO: f64 = 0.5;

/// Decides downstream parallelism and per-subtask input ranges for job
/// vertices of a batch DAG from finalized upstream byte statistics.
///
/// Constructed once per job from a validated [`SchedulerConfig`] snapshot
/// and invoked per job vertex; it keeps no state between calls.
#[derive(Debug, Clone)]
pub struct ParallelismDecider {
    min_parallelism: usize,
    max_parallelism: usize,
    data_volume_per_task: u64,
    default_source_parallelism: usize,
}

impl ParallelismDecider {
    /// Build a decider from a configuration snapshot, validating it first.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            min_parallelism: config.min_parallelism,
            max_parallelism: config.max_parallelism,
            data_volume_per_task: config.data_volume_per_task,
            default_source_parallelism: config.default_source_parallelism,
        })
    }

    /// Decide parallelism and input infos for one job vertex.
    ///
    /// `initial_parallelism` is `Some(p)` for a user-fixed parallelism and
    /// `None` when the decider should derive one from upstream statistics.
    /// Source vertices (no consumed results) return the fixed parallelism or
    /// the configured source default, with an empty input-info map.
    pub fn decide(
        &self,
        job_vertex_id: JobVertexId,
        consumed_results: &[BlockingResultInfo],
        initial_parallelism: Option<usize>,
    ) -> Result<ParallelismAndInputInfos> {
        if initial_parallelism == Some(0) {
            return Err(FbError::InvalidArgument(
                "initial parallelism must be unset or positive".to_string(),
            ));
        }

        if consumed_results.is_empty() {
            // source job vertex
            let parallelism = initial_parallelism.unwrap_or(self.default_source_parallelism);
            return Ok(ParallelismAndInputInfos {
                parallelism,
                input_infos: HashMap::new(),
            });
        }

        if initial_parallelism.is_none()
            && consumed_results.iter().all(|r| !r.is_pointwise())
            && !consumed_results.iter().all(|r| r.is_broadcast())
        {
            self.decide_and_evenly_distribute_data(job_vertex_id, consumed_results)
        } else {
            self.decide_and_evenly_distribute_subpartitions(
                job_vertex_id,
                consumed_results,
                initial_parallelism,
            )
        }
    }

    /// Derive a parallelism from produced bytes and the per-task budget,
    /// clamped into the configured window.
    pub fn decide_parallelism(
        &self,
        job_vertex_id: JobVertexId,
        consumed_results: &[BlockingResultInfo],
    ) -> Result<usize> {
        let broadcast_bytes = self.capped_broadcast_bytes(job_vertex_id, consumed_results)?;
        let non_broadcast_bytes = non_broadcast_bytes(consumed_results)?;

        let available = self.data_volume_per_task - broadcast_bytes;
        let mut parallelism = if available == 0 {
            // capped broadcast bytes consumed the whole budget; any
            // non-broadcast data saturates the window, none at all is
            // clamped to the minimum below
            if non_broadcast_bytes > 0 {
                self.max_parallelism
            } else {
                0
            }
        } else {
            non_broadcast_bytes.div_ceil(available) as usize
        };

        debug!(
            job_vertex_id = %job_vertex_id,
            broadcast_bytes,
            non_broadcast_bytes,
            parallelism,
            "initially decided parallelism"
        );

        if parallelism < self.min_parallelism {
            info!(
                job_vertex_id = %job_vertex_id,
                parallelism,
                min_parallelism = self.min_parallelism,
                "initially decided parallelism is smaller than the minimum; clamping"
            );
            parallelism = self.min_parallelism;
        } else if parallelism > self.max_parallelism {
            info!(
                job_vertex_id = %job_vertex_id,
                parallelism,
                max_parallelism = self.max_parallelism,
                "initially decided parallelism is larger than the maximum; clamping"
            );
            parallelism = self.max_parallelism;
        }

        Ok(parallelism)
    }

    /// Make downstream subtasks consume roughly the same number of
    /// subpartitions.
    fn decide_and_evenly_distribute_subpartitions(
        &self,
        job_vertex_id: JobVertexId,
        consumed_results: &[BlockingResultInfo],
        initial_parallelism: Option<usize>,
    ) -> Result<ParallelismAndInputInfos> {
        let parallelism = match initial_parallelism {
            Some(parallelism) => parallelism,
            None => self.decide_parallelism(job_vertex_id, consumed_results)?,
        };
        Ok(ParallelismAndInputInfos {
            parallelism,
            input_infos: compute_vertex_input_infos(parallelism, consumed_results)?,
        })
    }

    /// Make downstream subtasks consume roughly the same amount of data.
    ///
    /// Only valid when every consumed result is all-to-all; broadcast
    /// results contribute capped bytes to every subtask, non-broadcast ones
    /// are split along subpartition boundaries.
    fn decide_and_evenly_distribute_data(
        &self,
        job_vertex_id: JobVertexId,
        consumed_results: &[BlockingResultInfo],
    ) -> Result<ParallelismAndInputInfos> {
        if consumed_results.iter().any(|r| r.is_pointwise()) {
            return Err(FbError::InvalidState(
                "data-even distribution requires all-to-all inputs only".to_string(),
            ));
        }

        let broadcast_bytes = self.capped_broadcast_bytes(job_vertex_id, consumed_results)?;
        let non_broadcast_results: Vec<&BlockingResultInfo> = consumed_results
            .iter()
            .filter(|r| !r.is_broadcast())
            .collect();
        let num_subpartitions = check_and_get_subpartition_count(&non_broadcast_results)?;

        let limit = self.data_volume_per_task.saturating_sub(broadcast_bytes);
        let mut bytes_by_subpartition = vec![0u64; num_subpartitions];
        for result_info in &non_broadcast_results {
            let aggregated = result_info.aggregated_subpartition_bytes()?;
            for (total, bytes) in bytes_by_subpartition.iter_mut().zip(aggregated) {
                *total = total.saturating_add(*bytes);
            }
        }

        let mut subpartition_ranges = compute_subpartition_ranges(&bytes_by_subpartition, limit);

        if !self.is_legal_parallelism(subpartition_ranges.len()) {
            match self.adjust_to_closest_legal_parallelism(
                &bytes_by_subpartition,
                limit,
                subpartition_ranges.len(),
            ) {
                Some(adjusted_ranges) => subpartition_ranges = adjusted_ranges,
                None => {
                    // no data volume limit yields a parallelism inside the
                    // window; fall back to the subpartition-even split
                    info!(
                        job_vertex_id = %job_vertex_id,
                        "cannot find a legal parallelism to evenly distribute data; \
                         falling back to evenly distributing subpartitions"
                    );
                    return self.decide_and_evenly_distribute_subpartitions(
                        job_vertex_id,
                        consumed_results,
                        None,
                    );
                }
            }
        }

        check_exact_coverage(&subpartition_ranges, num_subpartitions)?;
        build_parallelism_and_input_infos(consumed_results, &subpartition_ranges)
    }

    /// Adjust the data volume limit so the resulting range count lands on
    /// the closest legal parallelism, returning the recomputed ranges.
    ///
    /// Below the minimum, a first search finds the largest limit still
    /// yielding enough ranges, and a second finds the smallest limit with
    /// that same count so range sums stay as tight (and the distribution as
    /// even) as possible. Above the maximum, only the smallest feasible
    /// limit is searched for.
    fn adjust_to_closest_legal_parallelism(
        &self,
        bytes_by_subpartition: &[u64],
        current_limit: u64,
        current_parallelism: usize,
    ) -> Option<Vec<IndexRange>> {
        let mut adjusted_limit = current_limit;
        if current_parallelism < self.min_parallelism {
            let min_subpartition_bytes =
                bytes_by_subpartition.iter().copied().min().unwrap_or(0);
            adjusted_limit = find_max_legal_value(
                |limit| {
                    compute_range_count(bytes_by_subpartition, limit) >= self.min_parallelism
                },
                min_subpartition_bytes,
                current_limit,
            )?;
            let closest_parallelism = compute_range_count(bytes_by_subpartition, adjusted_limit);
            adjusted_limit = find_min_legal_value(
                |limit| {
                    compute_range_count(bytes_by_subpartition, limit) == closest_parallelism
                },
                min_subpartition_bytes,
                adjusted_limit,
            )?;
        } else if current_parallelism > self.max_parallelism {
            let total_bytes = bytes_by_subpartition
                .iter()
                .fold(0u64, |acc, b| acc.saturating_add(*b));
            adjusted_limit = find_min_legal_value(
                |limit| {
                    compute_range_count(bytes_by_subpartition, limit) <= self.max_parallelism
                },
                current_limit,
                total_bytes,
            )?;
        }

        let adjusted_parallelism = compute_range_count(bytes_by_subpartition, adjusted_limit);
        if self.is_legal_parallelism(adjusted_parallelism) {
            Some(compute_subpartition_ranges(bytes_by_subpartition, adjusted_limit))
        } else {
            None
        }
    }

    /// Sum broadcast bytes, capped at [`BROADCAST_CAP_RATIO`] of the
    /// per-task budget.
    fn capped_broadcast_bytes(
        &self,
        job_vertex_id: JobVertexId,
        consumed_results: &[BlockingResultInfo],
    ) -> Result<u64> {
        let mut broadcast_bytes = 0u64;
        for result_info in consumed_results.iter().filter(|r| r.is_broadcast()) {
            broadcast_bytes = broadcast_bytes.saturating_add(result_info.num_bytes_produced()?);
        }

        let expected_max =
            (self.data_volume_per_task as f64 * BROADCAST_CAP_RATIO).ceil() as u64;
        if broadcast_bytes > expected_max {
            info!(
                job_vertex_id = %job_vertex_id,
                broadcast_bytes,
                expected_max,
                option = AVG_DATA_VOLUME_PER_TASK_KEY,
                cap_ratio = BROADCAST_CAP_RATIO,
                "broadcast bytes exceed the expected maximum; using the cap"
            );
            broadcast_bytes = expected_max;
        }
        Ok(broadcast_bytes)
    }

    fn is_legal_parallelism(&self, parallelism: usize) -> bool {
        parallelism >= self.min_parallelism && parallelism <= self.max_parallelism
    }
}

fn non_broadcast_bytes(consumed_results: &[BlockingResultInfo]) -> Result<u64> {
    let mut bytes = 0u64;
    for result_info in consumed_results.iter().filter(|r| !r.is_broadcast()) {
        bytes = bytes.saturating_add(result_info.num_bytes_produced()?);
    }
    Ok(bytes)
}

/// All partitions of all non-broadcast inputs must produce the same number
/// of subpartitions, otherwise the inputs cannot be co-partitioned.
fn check_and_get_subpartition_count(
    non_broadcast_results: &[&BlockingResultInfo],
) -> Result<usize> {
    let mut agreed: Option<usize> = None;
    for result_info in non_broadcast_results {
        for partition_index in 0..result_info.num_partitions() {
            let count = result_info.num_subpartitions(partition_index);
            match agreed {
                None => agreed = Some(count),
                Some(existing) if existing != count => {
                    return Err(FbError::InvalidState(format!(
                        "subpartition counts of all-to-all inputs disagree: {existing} vs {count}"
                    )));
                }
                Some(_) => {}
            }
        }
    }
    agreed.ok_or_else(|| {
        FbError::InvalidState("no non-broadcast input to co-partition".to_string())
    })
}

fn check_exact_coverage(subpartition_ranges: &[IndexRange], num_subpartitions: usize) -> Result<()> {
    let mut next = 0usize;
    for range in subpartition_ranges {
        if range.start != next || range.end < range.start {
            return Err(coverage_error(num_subpartitions));
        }
        next = range.end + 1;
    }
    if next != num_subpartitions {
        return Err(coverage_error(num_subpartitions));
    }
    Ok(())
}

fn coverage_error(num_subpartitions: usize) -> FbError {
    FbError::InvalidState(format!(
        "subpartition ranges do not cover [0, {}] exactly once",
        num_subpartitions.saturating_sub(1)
    ))
}

fn build_parallelism_and_input_infos(
    consumed_results: &[BlockingResultInfo],
    subpartition_ranges: &[IndexRange],
) -> Result<ParallelismAndInputInfos> {
    let mut input_infos = HashMap::with_capacity(consumed_results.len());
    for result_info in consumed_results {
        let partition_range = IndexRange::new(0, result_info.num_partitions() - 1);
        let execution_vertex_input_infos = subpartition_ranges
            .iter()
            .enumerate()
            .map(|(subtask_index, range)| ExecutionVertexInputInfo {
                subtask_index,
                partition_range,
                subpartition_range: if result_info.is_broadcast() {
                    IndexRange::new(0, 0)
                } else {
                    *range
                },
            })
            .collect();
        input_infos.insert(
            result_info.result_id(),
            JobVertexInputInfo {
                execution_vertex_input_infos,
            },
        );
    }
    Ok(ParallelismAndInputInfos {
        parallelism: subpartition_ranges.len(),
        input_infos,
    })
}
