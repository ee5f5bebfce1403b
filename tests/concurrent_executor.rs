// tests/concurrent_executor.rs

mod common;
use crate::common::builders::{AssetBuilder, PipelineBuilder};
use crate::common::fake_operator::{Behaviour, ExecutionLog, FakeOperator};
use crate::common::{
    TestResult, fake_registry, id_of, init_tracing, outcome_of, run_with_workers, with_timeout,
};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;

use assetdag::dag::Scheduler;
use assetdag::engine::{CancelSignal, Observers, RunObserver, StatusChangeEvent};
use assetdag::errors::{ExecutionError, SchedulerError};
use assetdag::exec::{ConcurrentExecutor, OperatorRegistry};
use assetdag::pipeline::Pipeline;
use assetdag::types::Status;

/// A -> B -> C, plus an unrelated D.
fn chain_plus_island() -> Arc<Pipeline> {
    PipelineBuilder::new()
        .with_asset(AssetBuilder::test("A").build())
        .with_asset(AssetBuilder::test("B").depends("A").build())
        .with_asset(AssetBuilder::test("C").depends("B").build())
        .with_asset(AssetBuilder::test("D").build())
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_roots_run_concurrently_and_chain_stays_ordered() -> TestResult {
    init_tracing();

    // A and D can only both pass the barrier if they run at the same time.
    let barrier = Arc::new(Barrier::new(2));
    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone())
        .on("A", Behaviour::Barrier(Arc::clone(&barrier)))
        .on("D", Behaviour::Barrier(barrier));

    let mut scheduler = Scheduler::new(chain_plus_island());
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(scheduler.instance_count_by_status(Status::Succeeded), 4);

    assert!(log.end_index("A") < log.start_index("B"));
    assert!(log.end_index("B") < log.start_index("C"));
    assert_eq!(log.max_concurrency(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_is_contained_to_its_downstream() -> TestResult {
    init_tracing();

    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone()).on("B", Behaviour::Fail);

    let mut scheduler = Scheduler::new(chain_plus_island());
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(outcome_of(&results, "A"), Some(true));
    assert_eq!(outcome_of(&results, "B"), Some(false));
    assert_eq!(outcome_of(&results, "D"), Some(true));
    // C was never dispatched, so it has no result.
    assert_eq!(outcome_of(&results, "C"), None);
    assert!(!log.was_started("C"));

    assert_eq!(scheduler.status_of(id_of(&scheduler, "C")), Some(Status::UpstreamFailed));
    assert_eq!(scheduler.status_of(id_of(&scheduler, "D")), Some(Status::Succeeded));
    Ok(())
}

#[tokio::test]
async fn checks_and_push_run_after_main_and_failed_check_does_not_block_push() -> TestResult {
    init_tracing();

    let pipeline = PipelineBuilder::new()
        .metadata_push(true)
        .with_asset(
            AssetBuilder::test("orders")
                .column_check("id", "not_null")
                .column_check("id", "unique")
                .custom_check("Row Count")
                .build(),
        )
        .with_asset(AssetBuilder::test("report").depends("orders").build())
        .build();

    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone()).on("orders:id:unique", Behaviour::Fail);

    let mut scheduler = Scheduler::new(pipeline);
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        4,
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(results.len(), 7);
    for check in ["orders:id:not_null", "orders:id:unique", "orders:custom-check:row_count"] {
        assert!(log.end_index("orders") < log.start_index(check));
        assert!(log.end_index(check) < log.start_index("orders:metadata-push"));
    }

    // The failed check is reported but neither the push nor the downstream
    // asset is affected.
    assert_eq!(outcome_of(&results, "orders:id:unique"), Some(false));
    assert_eq!(outcome_of(&results, "orders:metadata-push"), Some(true));
    assert_eq!(outcome_of(&results, "report"), Some(true));
    assert_eq!(scheduler.instance_count_by_status(Status::UpstreamFailed), 0);
    Ok(())
}

#[tokio::test]
async fn missing_operator_fails_without_retry() -> TestResult {
    init_tracing();

    let pipeline = PipelineBuilder::new()
        .with_asset(AssetBuilder::new("raw", "bq.sql").retries(3).build())
        .with_asset(AssetBuilder::test("clean").depends("raw").build())
        .build();

    let log = ExecutionLog::default();
    let mut scheduler = Scheduler::new(pipeline);
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(FakeOperator::new(log.clone())),
        1,
        CancelSignal::never(),
    ))
    .await?;

    assert_eq!(results.len(), 1);
    let raw = &results[0];
    assert_eq!(raw.attempts, 1);
    match raw.error.as_ref() {
        Some(err @ ExecutionError::NoOperator { .. }) => {
            assert!(err.to_string().contains("no executor registered"));
        }
        other => panic!("expected NoOperator, got {other:?}"),
    }
    assert_eq!(scheduler.status_of(id_of(&scheduler, "clean")), Some(Status::UpstreamFailed));
    assert!(log.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_attempts_are_retried_within_budget() -> TestResult {
    init_tracing();

    let pipeline = PipelineBuilder::new()
        .retries(1)
        .with_asset(AssetBuilder::test("flaky").retries(2).build())
        .with_asset(AssetBuilder::test("broken").build())
        .build();

    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone())
        .on("flaky", Behaviour::FailTimes(2))
        .on("broken", Behaviour::Fail);

    let mut scheduler = Scheduler::new(pipeline);
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    let flaky = results.iter().find(|r| r.instance.human_id() == "flaky").unwrap();
    assert!(flaky.is_success());
    assert_eq!(flaky.attempts, 3);
    assert_eq!(log.attempts("flaky"), 3);

    // Pipeline default applies: one retry, two attempts.
    let broken = results.iter().find(|r| r.instance.human_id() == "broken").unwrap();
    assert!(!broken.is_success());
    assert_eq!(broken.attempts, 2);
    assert_eq!(log.attempts("broken"), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_operator_fails_its_instance_and_run_completes() -> TestResult {
    init_tracing();

    let pipeline = PipelineBuilder::new()
        .retries(2)
        .with_asset(AssetBuilder::test("A").build())
        .with_asset(AssetBuilder::test("B").depends("A").build())
        .with_asset(AssetBuilder::test("C").depends("B").build())
        .with_asset(AssetBuilder::test("D").build())
        .build();

    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone()).on("A", Behaviour::Panic);

    let mut scheduler = Scheduler::new(pipeline);
    let results = with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    let a = results.iter().find(|r| r.instance.human_id() == "A").unwrap();
    match a.error.as_ref() {
        Some(ExecutionError::Panicked(msg)) => assert!(msg.contains("A blew up")),
        other => panic!("expected Panicked, got {other:?}"),
    }
    // A panic is not retried.
    assert_eq!(a.attempts, 1);
    assert_eq!(log.attempts("A"), 1);

    assert_eq!(outcome_of(&results, "D"), Some(true));
    assert_eq!(scheduler.status_of(id_of(&scheduler, "A")), Some(Status::Failed));
    for id in ["B", "C"] {
        assert_eq!(scheduler.status_of(id_of(&scheduler, id)), Some(Status::UpstreamFailed));
    }
    Ok(())
}

#[derive(Default)]
struct TransitionRecorder {
    events: std::sync::Mutex<Vec<(String, Status, Status)>>,
}

impl RunObserver for TransitionRecorder {
    fn on_status_change(&self, event: &StatusChangeEvent) {
        self.events.lock().unwrap().push((
            event.instance.human_id().to_string(),
            event.old,
            event.new,
        ));
    }
}

#[tokio::test]
async fn observers_see_only_legal_transitions() -> TestResult {
    init_tracing();

    let recorder = Arc::new(TransitionRecorder::default());
    let mut observers = Observers::new();
    observers.push(recorder.clone());

    let op = FakeOperator::new(ExecutionLog::default()).on("B", Behaviour::Fail);
    let mut scheduler = Scheduler::new(chain_plus_island()).with_observers(observers);
    with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    let events = recorder.events.lock().unwrap().clone();
    assert!(events.iter().all(|(_, old, new)| old.can_transition_to(*new)));

    let for_b: Vec<Status> = events
        .iter()
        .filter(|(id, _, _)| id == "B")
        .map(|(_, _, new)| *new)
        .collect();
    assert_eq!(for_b, vec![Status::Queued, Status::Running, Status::Failed]);

    let for_c: Vec<Status> = events
        .iter()
        .filter(|(id, _, _)| id == "C")
        .map(|(_, _, new)| *new)
        .collect();
    assert_eq!(for_c, vec![Status::UpstreamFailed]);
    Ok(())
}

#[test]
fn zero_workers_is_a_configuration_error() {
    let err = ConcurrentExecutor::new(OperatorRegistry::new(), 0).unwrap_err();
    assert!(err.to_string().contains("at least 1"));
}

#[tokio::test]
async fn run_without_workers_reports_closed_result_stream() {
    init_tracing();

    let mut scheduler = Scheduler::new(chain_plus_island());
    // Nobody takes the worker channels.
    let err = with_timeout(scheduler.run(CancelSignal::never()))
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::ResultStreamClosed { remaining: 4 }));
}

#[tokio::test]
async fn run_with_nothing_pending_returns_immediately() -> TestResult {
    init_tracing();

    let mut scheduler = Scheduler::new(chain_plus_island());
    scheduler.mark_all(Status::Succeeded);

    let channels = scheduler.worker_channels()?;
    let executor = ConcurrentExecutor::new(OperatorRegistry::new(), 2)?;
    let handles = executor.start(channels, Default::default());

    let results = with_timeout(scheduler.run(CancelSignal::never())).await?;
    assert!(results.is_empty());

    // The queue is closed, so the pool exits on its own.
    for handle in handles {
        with_timeout(handle).await?;
    }
    Ok(())
}

#[tokio::test]
async fn slow_instances_do_not_hold_up_others() -> TestResult {
    init_tracing();

    let log = ExecutionLog::default();
    let op = FakeOperator::new(log.clone()).on("A", Behaviour::Delay(Duration::from_millis(200)));

    let mut scheduler = Scheduler::new(chain_plus_island());
    with_timeout(run_with_workers(
        &mut scheduler,
        fake_registry(op),
        2,
        CancelSignal::never(),
    ))
    .await?;

    // D finished while A was still sleeping.
    assert!(log.end_index("D") < log.end_index("A"));
    Ok(())
}
