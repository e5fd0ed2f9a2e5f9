//! Integration tests for full search runs: partitioning, scanning, the
//! barrier trip and aggregation, through the public coordinator API.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tally::{
    event_channel, run_config, AggregateError, Dataset, DatasetConfig, EventSink, RowRange,
    RunEvent, RunStatus, SearchConfig, SearchPlan, SearchRun, TallyConfig, TallyError,
    WorkerState,
};
use tally_sync::BrokenCause;

fn parties(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn example_dataset() -> Arc<Dataset> {
    Arc::new(
        Dataset::from_rows(vec![
            vec![5, 5, 1],
            vec![5, 2, 2],
            vec![1, 1, 5],
            vec![5, 5, 5],
        ])
        .unwrap(),
    )
}

#[test]
fn test_example_two_parties() {
    let plan = SearchPlan::new(5, parties(2))
        .with_ranges(vec![RowRange::new(0, 2), RowRange::new(2, 4)]);

    let report = SearchRun::launch(example_dataset(), &plan, EventSink::disabled())
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.counts, vec![2, 1, 1, 3]);
    assert_eq!(report.status, RunStatus::Completed { generation: 0, total: 7 });
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.state == WorkerState::Released));
    assert_eq!(
        report.outcomes.iter().filter(|o| o.result.as_ref().unwrap().tripped).count(),
        1
    );
}

#[test]
fn test_generated_totals_match_reference_count() {
    let dataset_config = DatasetConfig {
        rows: 997,
        columns: 37,
        max_value: 10,
        seed: 7,
    };
    let dataset = Arc::new(Dataset::generate(&dataset_config).unwrap());
    let expected = dataset.count_value(5);

    for p in [1, 2, 3, 5, 8, 16] {
        let report = SearchRun::launch(
            Arc::clone(&dataset),
            &SearchPlan::new(5, parties(p)),
            EventSink::disabled(),
        )
        .unwrap()
        .join()
        .unwrap();

        assert_eq!(report.total(), Some(expected), "parties {p}");
        assert_eq!(report.outcomes.len(), p);
        let scanned: usize = report.outcomes.iter().map(|o| o.rows_scanned).sum();
        assert_eq!(scanned, 997);
    }
}

#[test]
fn test_bad_partition_rejected_before_launch() {
    let overlapping = SearchPlan::new(5, parties(2))
        .with_ranges(vec![RowRange::new(0, 3), RowRange::new(2, 4)]);
    assert!(matches!(
        SearchRun::launch(example_dataset(), &overlapping, EventSink::disabled()),
        Err(TallyError::PartitionInvariantViolation(_))
    ));

    let gapped = SearchPlan::new(5, parties(2))
        .with_ranges(vec![RowRange::new(0, 1), RowRange::new(2, 4)]);
    assert!(matches!(
        SearchRun::launch(example_dataset(), &gapped, EventSink::disabled()),
        Err(TallyError::PartitionInvariantViolation(_))
    ));

    assert!(matches!(
        SearchRun::launch(example_dataset(), &SearchPlan::new(5, parties(5)), EventSink::disabled()),
        Err(TallyError::PartitionInvariantViolation(_))
    ));
}

#[test]
fn test_failing_reduction_reports_trip_failure() {
    let reducer = |_: &[u64]| Err::<u64, AggregateError>(AggregateError::Overflow);
    let report = SearchRun::launch_with(
        example_dataset(),
        &SearchPlan::new(5, parties(2)),
        reducer,
        EventSink::disabled(),
    )
    .unwrap()
    .join()
    .unwrap();

    assert_eq!(
        report.status,
        RunStatus::TripFailed {
            cause: BrokenCause::TripActionFailed("aggregate overflowed".to_string())
        }
    );
    assert_eq!(report.total(), None);
    assert!(report.outcomes.iter().all(|o| o.state == WorkerState::Broken));
    // Scanning finished before the trip failed.
    assert_eq!(report.counts, vec![2, 1, 1, 3]);
}

#[test]
fn test_panicking_reduction_reports_trip_failure() {
    let reducer = |_: &[u64]| -> Result<u64, AggregateError> { panic!("reducer exploded") };
    let report = SearchRun::launch_with(
        example_dataset(),
        &SearchPlan::new(5, parties(2)),
        reducer,
        EventSink::disabled(),
    )
    .unwrap()
    .join()
    .unwrap();

    match &report.status {
        RunStatus::TripFailed {
            cause: BrokenCause::TripActionFailed(message),
        } => assert!(message.contains("reducer exploded"), "{message}"),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(report.total(), None);
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.state == WorkerState::Broken));
    assert!(report.outcomes.iter().all(|o| o.rows_scanned == o.range.len()));
    assert_eq!(report.counts, vec![2, 1, 1, 3]);
}

#[test]
fn test_events_reported() {
    let (events, rx) = event_channel();
    let report = SearchRun::launch(example_dataset(), &SearchPlan::new(5, parties(4)), events)
        .unwrap()
        .join()
        .unwrap();
    assert!(report.is_completed());

    let received: Vec<RunEvent> = rx.try_iter().collect();
    let started = received
        .iter()
        .filter(|e| matches!(e, RunEvent::WorkerStarted { .. }))
        .count();
    let released = received
        .iter()
        .filter(|e| matches!(e, RunEvent::WorkerReleased { .. }))
        .count();
    assert_eq!(started, 4);
    assert_eq!(released, 4);
    assert!(received.contains(&RunEvent::Aggregated { generation: 0, total: 7 }));
}

#[test]
fn test_run_config_end_to_end() {
    let config = TallyConfig {
        dataset: DatasetConfig {
            rows: 200,
            columns: 50,
            max_value: 10,
            seed: 99,
        },
        search: SearchConfig {
            target: 3,
            participants: 4,
            wait_timeout_ms: Some(10_000),
        },
    };
    let expected = Dataset::generate(&config.dataset).unwrap().count_value(3);

    let report = run_config(&config, EventSink::disabled()).unwrap();
    assert_eq!(report.total(), Some(expected));
}

#[test]
fn test_run_config_rejects_empty_dataset() {
    let mut config = TallyConfig::default();
    config.dataset.rows = 0;
    assert!(matches!(
        run_config(&config, EventSink::disabled()),
        Err(TallyError::InvalidConfig(_))
    ));
}
