pub mod builders;
pub mod fake_operator;

use std::sync::{Arc, Once};

use tracing_subscriber::{fmt, EnvFilter};

use assetdag::dag::Scheduler;
use assetdag::engine::{CancelSignal, TaskExecutionResult};
use assetdag::errors::SchedulerError;
use assetdag::exec::{ConcurrentExecutor, ExecutionContext, OperatorRegistry};
use assetdag::pipeline::{Pipeline, RawPipelineFile};
use assetdag::types::AssetType;

use crate::fake_operator::FakeOperator;

/// Asset type that test pipelines use for fake operators.
pub const TEST_ASSET_TYPE: &str = "test";

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Registry with `op` serving every instance kind of the `test` type.
pub fn fake_registry(op: FakeOperator) -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry.register_all_kinds(AssetType::from(TEST_ASSET_TYPE), Arc::new(op));
    registry
}

/// Wire a scheduler to a fresh worker pool and drive one run to completion.
pub async fn run_with_workers(
    scheduler: &mut Scheduler,
    registry: OperatorRegistry,
    workers: usize,
    cancel: CancelSignal,
) -> Result<Vec<TaskExecutionResult>, SchedulerError> {
    let executor = ConcurrentExecutor::new(registry, workers).expect("invalid worker count");
    let channels = scheduler.worker_channels()?;
    let ctx = ExecutionContext::default().with_cancel(cancel.clone());
    let handles = executor.start(channels, ctx);

    let results = scheduler.run(cancel).await;

    for handle in handles {
        handle.await.expect("worker panicked");
    }
    results
}

/// Human id -> error presence, for compact assertions.
pub fn outcome_of(results: &[TaskExecutionResult], human_id: &str) -> Option<bool> {
    results
        .iter()
        .find(|r| r.instance.human_id() == human_id)
        .map(|r| r.is_success())
}

/// Instance id by human id; panics if missing.
pub fn id_of(scheduler: &Scheduler, human_id: &str) -> usize {
    scheduler
        .instance_by_human_id(human_id)
        .unwrap_or_else(|| panic!("no instance '{human_id}'"))
        .id()
}

/// Convenience for tests that build pipelines from TOML text.
pub fn pipeline_from_toml(src: &str) -> Arc<Pipeline> {
    let raw: RawPipelineFile = toml::from_str(src).expect("invalid test TOML");
    Arc::new(Pipeline::try_from(raw).expect("invalid test pipeline"))
}
