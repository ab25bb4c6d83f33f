//! Byte statistics of finalized upstream blocking results.
//!
//! Contract:
//! - producers record per-partition subpartition byte sizes before the
//!   decider runs; the decider only reads;
//! - all-to-all results aggregate per-subpartition bytes once every
//!   partition has reported, then drop the raw per-partition state;
//! - resets are ignored once an all-to-all result is aggregated (blocking
//!   results are finalized);
//! - pointwise results keep per-partition byte vectors keyed by partition
//!   index.

use std::collections::BTreeMap;

use fb_common::{FbError, Result, ResultId};

/// Per-kind statistics payload of a blocking result.
#[derive(Debug, Clone)]
enum ResultKind {
    AllToAll {
        broadcast: bool,
        subpartition_bytes_by_partition: BTreeMap<usize, Vec<u64>>,
        aggregated_subpartition_bytes: Option<Vec<u64>>,
    },
    Pointwise {
        subpartition_bytes_by_partition: BTreeMap<usize, Vec<u64>>,
    },
}

/// Topology and byte statistics of one upstream blocking result.
///
/// Every partition produces the same number of subpartitions; broadcast
/// results deliver their single subpartition 0 to every downstream subtask.
#[derive(Debug, Clone)]
pub struct BlockingResultInfo {
    result_id: ResultId,
    num_partitions: usize,
    num_subpartitions: usize,
    kind: ResultKind,
}

impl BlockingResultInfo {
    /// Create statistics for an all-to-all result.
    pub fn new_all_to_all(
        result_id: ResultId,
        num_partitions: usize,
        num_subpartitions: usize,
        broadcast: bool,
    ) -> Result<Self> {
        check_topology(num_partitions, num_subpartitions)?;
        if broadcast && num_subpartitions != 1 {
            return Err(FbError::InvalidArgument(format!(
                "broadcast results must have a single subpartition, got {num_subpartitions}"
            )));
        }
        Ok(Self {
            result_id,
            num_partitions,
            num_subpartitions,
            kind: ResultKind::AllToAll {
                broadcast,
                subpartition_bytes_by_partition: BTreeMap::new(),
                aggregated_subpartition_bytes: None,
            },
        })
    }

    /// Create statistics for a pointwise result.
    pub fn new_pointwise(
        result_id: ResultId,
        num_partitions: usize,
        num_subpartitions: usize,
    ) -> Result<Self> {
        check_topology(num_partitions, num_subpartitions)?;
        Ok(Self {
            result_id,
            num_partitions,
            num_subpartitions,
            kind: ResultKind::Pointwise {
                subpartition_bytes_by_partition: BTreeMap::new(),
            },
        })
    }

    /// Identifier of the upstream intermediate dataset.
    pub fn result_id(&self) -> ResultId {
        self.result_id
    }

    /// Number of upstream partitions producing this result.
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Number of subpartitions produced by the given partition.
    pub fn num_subpartitions(&self, _partition_index: usize) -> usize {
        self.num_subpartitions
    }

    /// Whether every downstream subtask consumes subpartition 0 in full.
    pub fn is_broadcast(&self) -> bool {
        matches!(self.kind, ResultKind::AllToAll { broadcast: true, .. })
    }

    /// Whether this is a forward-like exchange.
    pub fn is_pointwise(&self) -> bool {
        matches!(self.kind, ResultKind::Pointwise { .. })
    }

    /// Record finalized subpartition byte sizes for one partition.
    ///
    /// Recording after an all-to-all result has aggregated is a no-op.
    pub fn record_partition_info(
        &mut self,
        partition_index: usize,
        subpartition_bytes: &[u64],
    ) -> Result<()> {
        if partition_index >= self.num_partitions {
            return Err(FbError::InvalidArgument(format!(
                "partition index {partition_index} outside partition count {}",
                self.num_partitions
            )));
        }
        if subpartition_bytes.len() != self.num_subpartitions {
            return Err(FbError::InvalidArgument(format!(
                "got {} subpartition byte sizes for a result with {} subpartitions",
                subpartition_bytes.len(),
                self.num_subpartitions
            )));
        }
        match &mut self.kind {
            ResultKind::AllToAll {
                subpartition_bytes_by_partition,
                aggregated_subpartition_bytes,
                ..
            } => {
                if aggregated_subpartition_bytes.is_none() {
                    subpartition_bytes_by_partition
                        .insert(partition_index, subpartition_bytes.to_vec());
                    if subpartition_bytes_by_partition.len() == self.num_partitions {
                        let mut aggregated = vec![0u64; self.num_subpartitions];
                        for bytes in subpartition_bytes_by_partition.values() {
                            for (total, value) in aggregated.iter_mut().zip(bytes) {
                                *total = total.saturating_add(*value);
                            }
                        }
                        *aggregated_subpartition_bytes = Some(aggregated);
                        subpartition_bytes_by_partition.clear();
                    }
                }
            }
            ResultKind::Pointwise {
                subpartition_bytes_by_partition,
            } => {
                subpartition_bytes_by_partition.insert(partition_index, subpartition_bytes.to_vec());
            }
        }
        Ok(())
    }

    /// Drop the recorded statistics of one partition, e.g. after a producer
    /// restart invalidated them. Ignored once aggregated.
    pub fn reset_partition_info(&mut self, partition_index: usize) {
        match &mut self.kind {
            ResultKind::AllToAll {
                subpartition_bytes_by_partition,
                aggregated_subpartition_bytes,
                ..
            } => {
                if aggregated_subpartition_bytes.is_none() {
                    subpartition_bytes_by_partition.remove(&partition_index);
                }
            }
            ResultKind::Pointwise {
                subpartition_bytes_by_partition,
            } => {
                subpartition_bytes_by_partition.remove(&partition_index);
            }
        }
    }

    /// Total bytes produced across all partitions and subpartitions.
    ///
    /// Fails with [`FbError::InvalidState`] until every partition reported.
    pub fn num_bytes_produced(&self) -> Result<u64> {
        match &self.kind {
            ResultKind::AllToAll { broadcast, .. } => {
                let aggregated = self.aggregated_subpartition_bytes()?;
                if *broadcast {
                    Ok(aggregated[0])
                } else {
                    Ok(aggregated.iter().fold(0u64, |acc, b| acc.saturating_add(*b)))
                }
            }
            ResultKind::Pointwise {
                subpartition_bytes_by_partition,
            } => {
                if subpartition_bytes_by_partition.len() != self.num_partitions {
                    return Err(FbError::InvalidState(
                        "not all partition statistics are ready".to_string(),
                    ));
                }
                Ok(subpartition_bytes_by_partition
                    .values()
                    .flatten()
                    .fold(0u64, |acc, b| acc.saturating_add(*b)))
            }
        }
    }

    /// Per-subpartition bytes summed across all partitions.
    ///
    /// Only available on all-to-all results, and only after every partition
    /// reported.
    pub fn aggregated_subpartition_bytes(&self) -> Result<&[u64]> {
        match &self.kind {
            ResultKind::AllToAll {
                aggregated_subpartition_bytes: Some(aggregated),
                ..
            } => Ok(aggregated),
            ResultKind::AllToAll { .. } => Err(FbError::InvalidState(
                "not all partition statistics are ready".to_string(),
            )),
            ResultKind::Pointwise { .. } => Err(FbError::InvalidState(
                "pointwise results do not aggregate subpartition bytes".to_string(),
            )),
        }
    }
}

fn check_topology(num_partitions: usize, num_subpartitions: usize) -> Result<()> {
    if num_partitions == 0 || num_subpartitions == 0 {
        return Err(FbError::InvalidArgument(format!(
            "blocking results need at least one partition and subpartition, got {num_partitions}x{num_subpartitions}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_all_to_all_bytes_across_partitions() {
        let mut info = BlockingResultInfo::new_all_to_all(ResultId(1), 2, 3, false).unwrap();
        assert!(info.aggregated_subpartition_bytes().is_err());

        info.record_partition_info(0, &[1, 2, 3]).unwrap();
        assert!(info.aggregated_subpartition_bytes().is_err());

        info.record_partition_info(1, &[10, 20, 30]).unwrap();
        assert_eq!(info.aggregated_subpartition_bytes().unwrap(), &[11, 22, 33]);
        assert_eq!(info.num_bytes_produced().unwrap(), 66);
    }

    #[test]
    fn reset_before_aggregation_discards_partition() {
        let mut info = BlockingResultInfo::new_all_to_all(ResultId(1), 2, 2, false).unwrap();
        info.record_partition_info(0, &[5, 5]).unwrap();
        info.reset_partition_info(0);
        info.record_partition_info(1, &[1, 1]).unwrap();
        assert!(info.aggregated_subpartition_bytes().is_err());

        info.record_partition_info(0, &[2, 2]).unwrap();
        assert_eq!(info.aggregated_subpartition_bytes().unwrap(), &[3, 3]);
    }

    #[test]
    fn reset_after_aggregation_is_ignored() {
        let mut info = BlockingResultInfo::new_all_to_all(ResultId(1), 1, 2, false).unwrap();
        info.record_partition_info(0, &[4, 6]).unwrap();
        info.reset_partition_info(0);
        assert_eq!(info.aggregated_subpartition_bytes().unwrap(), &[4, 6]);
        info.record_partition_info(0, &[100, 100]).unwrap();
        assert_eq!(info.num_bytes_produced().unwrap(), 10);
    }

    #[test]
    fn broadcast_bytes_come_from_subpartition_zero() {
        let mut info = BlockingResultInfo::new_all_to_all(ResultId(7), 2, 1, true).unwrap();
        info.record_partition_info(0, &[8]).unwrap();
        info.record_partition_info(1, &[9]).unwrap();
        assert!(info.is_broadcast());
        assert_eq!(info.num_bytes_produced().unwrap(), 17);
    }

    #[test]
    fn pointwise_sums_partition_vectors() {
        let mut info = BlockingResultInfo::new_pointwise(ResultId(2), 2, 2).unwrap();
        info.record_partition_info(0, &[1, 2]).unwrap();
        assert!(info.num_bytes_produced().is_err());

        info.record_partition_info(1, &[3, 4]).unwrap();
        assert!(info.is_pointwise());
        assert_eq!(info.num_bytes_produced().unwrap(), 10);
        assert!(info.aggregated_subpartition_bytes().is_err());
    }

    #[test]
    fn rejects_malformed_recordings() {
        let mut info = BlockingResultInfo::new_all_to_all(ResultId(3), 1, 2, false).unwrap();
        assert!(matches!(
            info.record_partition_info(1, &[1, 2]),
            Err(FbError::InvalidArgument(_))
        ));
        assert!(matches!(
            info.record_partition_info(0, &[1]),
            Err(FbError::InvalidArgument(_))
        ));
        assert!(BlockingResultInfo::new_pointwise(ResultId(4), 0, 1).is_err());
    }

    #[test]
    fn broadcast_with_multiple_subpartitions_is_rejected_at_construction() {
        assert!(matches!(
            BlockingResultInfo::new_all_to_all(ResultId(5), 1, 2, true),
            Err(FbError::InvalidArgument(_))
        ));
    }
}
