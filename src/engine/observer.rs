// src/engine/observer.rs

//! Hooks for watching a run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::TaskInstance;
use crate::engine::StatusChangeEvent;
use crate::errors::ExecutionError;

/// Receives status transitions and task boundaries. Every hook defaults to a
/// no-op.
///
/// `on_status_change` is called from the scheduler loop; the task hooks are
/// called from workers, once per attempt.
pub trait RunObserver: Send + Sync {
    fn on_status_change(&self, _event: &StatusChangeEvent) {}

    fn on_task_started(&self, _instance: &TaskInstance) {}

    fn on_task_ended(
        &self,
        _instance: &TaskInstance,
        _error: Option<&ExecutionError>,
        _duration: Duration,
    ) {
    }
}

/// Fan-out over a list of observers. Empty means no-op.
#[derive(Clone, Default)]
pub struct Observers(Vec<Arc<dyn RunObserver>>);

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl RunObserver + 'static) -> Self {
        self.0.push(Arc::new(observer));
        self
    }

    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.0.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn on_status_change(&self, event: &StatusChangeEvent) {
        for o in self.0.iter() {
            o.on_status_change(event);
        }
    }

    pub fn on_task_started(&self, instance: &TaskInstance) {
        for o in self.0.iter() {
            o.on_task_started(instance);
        }
    }

    pub fn on_task_ended(
        &self,
        instance: &TaskInstance,
        error: Option<&ExecutionError>,
        duration: Duration,
    ) {
        for o in self.0.iter() {
            o.on_task_ended(instance, error, duration);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.0.len())
            .finish()
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_status_change(&self, event: &StatusChangeEvent) {
        debug!(
            instance = %event.instance,
            from = %event.old,
            to = %event.new,
            "status change"
        );
    }

    fn on_task_started(&self, instance: &TaskInstance) {
        info!(instance = %instance, asset = instance.asset_name(), "task started");
    }

    fn on_task_ended(
        &self,
        instance: &TaskInstance,
        error: Option<&ExecutionError>,
        duration: Duration,
    ) {
        match error {
            None => info!(
                instance = %instance,
                elapsed_ms = duration.as_millis() as u64,
                "task finished"
            ),
            Some(err) => warn!(
                instance = %instance,
                elapsed_ms = duration.as_millis() as u64,
                error = %err,
                "task failed"
            ),
        }
    }
}

/// Human-readable progress on stdout:
///
/// ```text
/// [14:02:11] Running:  orders
/// [14:02:12] Finished: orders (842ms)
/// [14:02:12] Failed:   orders:id:not_null (12ms)
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressPrinter;

impl ProgressPrinter {
    fn timestamp() -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

impl RunObserver for ProgressPrinter {
    fn on_task_started(&self, instance: &TaskInstance) {
        println!("[{}] Running:  {}", Self::timestamp(), instance);
    }

    fn on_task_ended(
        &self,
        instance: &TaskInstance,
        error: Option<&ExecutionError>,
        duration: Duration,
    ) {
        let label = if error.is_none() { "Finished:" } else { "Failed:  " };
        println!(
            "[{}] {} {} ({})",
            Self::timestamp(),
            label,
            instance,
            format_duration(duration)
        );
    }
}

/// `842ms`, `3.2s`, `2m05s`.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::from_millis(12)), "12ms");
        assert_eq!(format_duration(Duration::from_millis(3_240)), "3.2s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
