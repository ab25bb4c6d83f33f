//! End-to-end decider scenarios over finalized upstream statistics.

use fb_common::{FbError, JobVertexId, ResultId, SchedulerConfig};
use fb_scheduler::{
    BlockingResultInfo, IndexRange, JobVertexInputInfo, ParallelismDecider,
};

const BYTES_256_MB: u64 = 256 * 1024 * 1024;
const BYTES_512_MB: u64 = 512 * 1024 * 1024;
const BYTES_1_GB: u64 = 1024 * 1024 * 1024;
const BYTES_8_GB: u64 = 8 * 1024 * 1024 * 1024;
const BYTES_1_TB: u64 = 1024 * 1024 * 1024 * 1024;

const VERTEX: JobVertexId = JobVertexId(42);

fn decider(min_parallelism: usize, max_parallelism: usize, data_volume: u64) -> ParallelismDecider {
    ParallelismDecider::from_config(&SchedulerConfig {
        min_parallelism,
        max_parallelism,
        data_volume_per_task: data_volume,
        default_source_parallelism: 10,
    })
    .unwrap()
}

fn default_decider() -> ParallelismDecider {
    decider(3, 100, BYTES_1_GB)
}

/// All-to-all result with one partition, so the recorded subpartition bytes
/// are also the aggregated ones.
fn all_to_all(id: u64, subpartition_bytes: &[u64]) -> BlockingResultInfo {
    let mut info =
        BlockingResultInfo::new_all_to_all(ResultId(id), 1, subpartition_bytes.len(), false)
            .unwrap();
    info.record_partition_info(0, subpartition_bytes).unwrap();
    info
}

fn broadcast(id: u64, bytes: u64) -> BlockingResultInfo {
    let mut info = BlockingResultInfo::new_all_to_all(ResultId(id), 1, 1, true).unwrap();
    info.record_partition_info(0, &[bytes]).unwrap();
    info
}

fn non_broadcast(id: u64, bytes: u64) -> BlockingResultInfo {
    all_to_all(id, &[bytes])
}

fn pointwise(id: u64, subpartition_bytes_by_partition: &[&[u64]]) -> BlockingResultInfo {
    let num_subpartitions = subpartition_bytes_by_partition[0].len();
    let mut info = BlockingResultInfo::new_pointwise(
        ResultId(id),
        subpartition_bytes_by_partition.len(),
        num_subpartitions,
    )
    .unwrap();
    for (partition_index, bytes) in subpartition_bytes_by_partition.iter().enumerate() {
        info.record_partition_info(partition_index, bytes).unwrap();
    }
    info
}

fn assert_all_to_all_assignment(
    input_info: &JobVertexInputInfo,
    num_partitions: usize,
    expected_subpartition_ranges: &[(usize, usize)],
) {
    let infos = &input_info.execution_vertex_input_infos;
    assert_eq!(infos.len(), expected_subpartition_ranges.len());
    for (i, vertex_info) in infos.iter().enumerate() {
        assert_eq!(vertex_info.subtask_index, i);
        assert_eq!(
            vertex_info.partition_range,
            IndexRange::new(0, num_partitions - 1)
        );
        let (start, end) = expected_subpartition_ranges[i];
        assert_eq!(vertex_info.subpartition_range, IndexRange::new(start, end));
    }
}

#[test]
fn decides_parallelism_from_byte_totals() {
    let decider = default_decider();
    let results = [
        broadcast(1, BYTES_256_MB),
        non_broadcast(2, BYTES_256_MB + BYTES_8_GB),
    ];
    assert_eq!(decider.decide_parallelism(VERTEX, &results).unwrap(), 11);
}

#[test]
fn clamps_decided_parallelism_to_maximum() {
    let decider = default_decider();
    let results = [
        broadcast(1, BYTES_256_MB),
        non_broadcast(2, BYTES_8_GB + BYTES_1_TB),
    ];
    assert_eq!(decider.decide_parallelism(VERTEX, &results).unwrap(), 100);
}

#[test]
fn clamps_decided_parallelism_to_minimum() {
    let decider = default_decider();
    let results = [broadcast(1, BYTES_256_MB), non_broadcast(2, BYTES_512_MB)];
    assert_eq!(decider.decide_parallelism(VERTEX, &results).unwrap(), 3);
}

#[test]
fn caps_broadcast_bytes_at_half_the_budget() {
    let decider = default_decider();
    let results = [broadcast(1, BYTES_1_GB), non_broadcast(2, BYTES_8_GB)];
    // 8GiB / (1GiB - 512MiB) = 16
    assert_eq!(decider.decide_parallelism(VERTEX, &results).unwrap(), 16);
}

#[test]
fn exhausted_budget_clamps_by_non_broadcast_bytes() {
    // A one-byte budget is fully consumed by the capped broadcast bytes:
    // with no non-broadcast data the minimum wins, with any the maximum.
    let decider = decider(2, 5, 1);
    assert_eq!(
        decider
            .decide_parallelism(VERTEX, &[broadcast(1, 10)])
            .unwrap(),
        2
    );
    assert_eq!(
        decider
            .decide_parallelism(VERTEX, &[broadcast(1, 10), non_broadcast(2, 7)])
            .unwrap(),
        5
    );
}

#[test]
fn rounds_up_non_divisible_byte_totals() {
    let decider = default_decider();
    let results = [
        broadcast(1, BYTES_512_MB),
        non_broadcast(2, BYTES_256_MB + BYTES_8_GB),
    ];
    assert_eq!(decider.decide_parallelism(VERTEX, &results).unwrap(), 17);
}

#[test]
fn splits_all_to_all_inputs_by_bytes() {
    let decider = decider(1, 10, 60);
    let results = [
        all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17]),
        all_to_all(2, &[8, 12, 21, 9, 13, 7, 19, 13, 14, 5]),
    ];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 5);
    assert_eq!(decision.input_infos.len(), 2);
    let expected = [(0, 1), (2, 3), (4, 6), (7, 8), (9, 9)];
    for id in [1, 2] {
        assert_all_to_all_assignment(&decision.input_infos[&ResultId(id)], 1, &expected);
    }
}

#[test]
fn adjusts_limit_upward_when_over_maximum() {
    let decider = decider(1, 2, 10);
    let results = [all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17])];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 2);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[(0, 5), (6, 9)],
    );
}

#[test]
fn tightens_limit_for_most_even_split_when_under_minimum() {
    let decider = decider(4, 10, 1000);
    let results = [all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17])];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 4);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[(0, 1), (2, 5), (6, 7), (8, 9)],
    );
}

#[test]
fn falls_back_to_subpartition_even_split() {
    // No data volume limit yields exactly 8 ranges for this alternating
    // weight pattern, so the decider falls back.
    let decider = decider(8, 8, 10);
    let results = [all_to_all(1, &[10, 1, 10, 1, 10, 1, 10, 1, 10, 1])];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 8);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[
            (0, 0),
            (1, 1),
            (2, 2),
            (3, 4),
            (5, 5),
            (6, 6),
            (7, 7),
            (8, 9),
        ],
    );
}

#[test]
fn broadcast_input_is_delivered_whole_to_every_subtask() {
    let decider = decider(1, 10, 60);
    let results = [
        all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17]),
        broadcast(2, 10),
    ];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 3);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[(0, 3), (4, 7), (8, 9)],
    );
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(2)],
        1,
        &[(0, 0), (0, 0), (0, 0)],
    );
}

#[test]
fn all_broadcast_inputs_use_the_clamped_minimum() {
    let decider = decider(1, 10, 60);
    let results = [broadcast(1, 10), broadcast(2, 10)];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 1);
    assert_all_to_all_assignment(&decision.input_infos[&ResultId(1)], 1, &[(0, 0)]);
    assert_all_to_all_assignment(&decision.input_infos[&ResultId(2)], 1, &[(0, 0)]);
}

#[test]
fn fixed_parallelism_splits_subpartitions_evenly() {
    let decider = default_decider();
    let results = [all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17])];
    let decision = decider.decide(VERTEX, &results, Some(3)).unwrap();

    assert_eq!(decision.parallelism, 3);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[(0, 2), (3, 5), (6, 9)],
    );
}

#[test]
fn mixed_pointwise_and_all_to_all_inputs() {
    let decider = decider(1, 10, 60);
    let results = [
        all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17]),
        pointwise(2, &[&[8, 12, 21, 9, 13], &[7, 19, 13, 14, 5]]),
    ];
    let decision = decider.decide(VERTEX, &results, None).unwrap();

    assert_eq!(decision.parallelism, 4);
    assert_all_to_all_assignment(
        &decision.input_infos[&ResultId(1)],
        1,
        &[(0, 1), (2, 4), (5, 6), (7, 9)],
    );

    let pointwise_infos = &decision.input_infos[&ResultId(2)].execution_vertex_input_infos;
    let expected = [
        ((0, 0), (0, 1)),
        ((0, 0), (2, 4)),
        ((1, 1), (0, 1)),
        ((1, 1), (2, 4)),
    ];
    assert_eq!(pointwise_infos.len(), expected.len());
    for (i, vertex_info) in pointwise_infos.iter().enumerate() {
        let ((ps, pe), (ss, se)) = expected[i];
        assert_eq!(vertex_info.subtask_index, i);
        assert_eq!(vertex_info.partition_range, IndexRange::new(ps, pe));
        assert_eq!(vertex_info.subpartition_range, IndexRange::new(ss, se));
    }
}

#[test]
fn source_vertex_uses_default_parallelism() {
    let decision = default_decider().decide(VERTEX, &[], None).unwrap();
    assert_eq!(decision.parallelism, 10);
    assert!(decision.input_infos.is_empty());
}

#[test]
fn source_vertex_keeps_fixed_parallelism_verbatim() {
    // A user-fixed source parallelism is returned even outside the window.
    let decision = default_decider().decide(VERTEX, &[], Some(1000)).unwrap();
    assert_eq!(decision.parallelism, 1000);
    assert!(decision.input_infos.is_empty());
}

#[test]
fn zero_initial_parallelism_is_rejected() {
    let result = default_decider().decide(VERTEX, &[], Some(0));
    assert!(matches!(result, Err(FbError::InvalidArgument(_))));
}

#[test]
fn disagreeing_subpartition_counts_are_rejected() {
    let decider = decider(1, 10, 60);
    let results = [
        all_to_all(1, &[10, 15, 13, 12, 1]),
        all_to_all(2, &[8, 12, 21]),
    ];
    assert!(matches!(
        decider.decide(VERTEX, &results, None),
        Err(FbError::InvalidState(_))
    ));
}

#[test]
fn identical_inputs_decide_identically() {
    let decider = decider(1, 10, 60);
    let results = [
        all_to_all(1, &[10, 15, 13, 12, 1, 10, 8, 20, 12, 17]),
        pointwise(2, &[&[8, 12, 21, 9, 13], &[7, 19, 13, 14, 5]]),
    ];
    let first = decider.decide(VERTEX, &results, None).unwrap();
    let second = decider.decide(VERTEX, &results, None).unwrap();
    assert_eq!(first, second);
}
