// src/report.rs

//! End-of-run summary.

use std::fmt::Write as _;
use std::time::Duration;

use crate::dag::Scheduler;
use crate::engine::TaskExecutionResult;
use crate::engine::observer::format_duration;
use crate::types::{InstanceKind, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub instance: String,
    pub error: String,
    pub attempts: u32,
}

/// Assets that never ran because something upstream failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailedAsset {
    pub asset: String,
    /// Non-main instances of the asset that were also upstream-failed.
    pub checks: usize,
}

/// Result set partitioned for reporting.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub executed: usize,
    pub duration: Duration,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedTask>,
    pub upstream_failed: Vec<UpstreamFailedAsset>,
    pub skipped: usize,
}

impl RunSummary {
    pub fn new(results: &[TaskExecutionResult], scheduler: &Scheduler, duration: Duration) -> Self {
        let mut summary = RunSummary {
            executed: results.len(),
            duration,
            skipped: scheduler.instance_count_by_status(Status::Skipped),
            ..Default::default()
        };

        for res in results {
            match res.error.as_ref() {
                None => summary.succeeded.push(res.instance.human_id().to_string()),
                Some(err) => summary.failed.push(FailedTask {
                    instance: res.instance.human_id().to_string(),
                    error: format!("{err:#}"),
                    attempts: res.attempts,
                }),
            }
        }

        // Group by asset, in pipeline order.
        for instance in scheduler.task_instances_by_status(Status::UpstreamFailed) {
            let asset = instance.asset_name();
            let idx = match summary.upstream_failed.iter().position(|u| u.asset == asset) {
                Some(idx) => idx,
                None => {
                    summary.upstream_failed.push(UpstreamFailedAsset {
                        asset: asset.to_string(),
                        checks: 0,
                    });
                    summary.upstream_failed.len() - 1
                }
            };
            if instance.kind() != InstanceKind::Main {
                summary.upstream_failed[idx].checks += 1;
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// `0` on a clean run, `1` if any instance failed.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() { 1 } else { 0 }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "\nExecuted {} tasks in {}",
            self.executed,
            format_duration(self.duration)
        );

        if self.skipped > 0 {
            let _ = writeln!(out, "Skipped {} tasks", self.skipped);
        }

        if !self.failed.is_empty() {
            let _ = writeln!(out, "\nFailed tasks: {}", self.failed.len());
            for f in self.failed.iter() {
                let _ = writeln!(out, "  - {}", f.instance);
                let _ = writeln!(out, "    └── {}", f.error);
                if f.attempts > 1 {
                    let _ = writeln!(out, "        (after {} attempts)", f.attempts);
                }
            }
        }

        if !self.upstream_failed.is_empty() {
            let _ = writeln!(
                out,
                "\nThe following tasks are skipped due to their upstream failing:"
            );
            for u in self.upstream_failed.iter() {
                if u.checks == 0 {
                    let _ = writeln!(out, "  - {}", u.asset);
                } else {
                    let _ = writeln!(out, "  - {} (and {} checks)", u.asset, u.checks);
                }
            }
        }

        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::errors::ExecutionError;
    use crate::pipeline::{Pipeline, RawPipelineFile};

    #[test]
    fn groups_upstream_failures_by_asset() {
        let raw: RawPipelineFile = toml::from_str(
            r#"
[[asset]]
name = "a"
type = "empty"

[[asset]]
name = "b"
type = "empty"
depends = ["a"]

[[asset.columns]]
name = "id"
checks = [{ name = "not_null" }, { name = "unique" }]

[[asset]]
name = "c"
type = "empty"
depends = ["b"]
"#,
        )
        .unwrap();
        let mut scheduler = Scheduler::new(Arc::new(Pipeline::try_from(raw).unwrap()));
        scheduler.kickstart().unwrap();

        let a = Arc::clone(&scheduler.task_instances()[0]);
        scheduler.on_started(a.id());
        let result = TaskExecutionResult {
            instance: a,
            error: Some(ExecutionError::Operator(anyhow::anyhow!("exit 1"))),
            duration: Duration::from_millis(5),
            attempts: 2,
        };
        scheduler.on_finished(&result);

        let summary = RunSummary::new(&[result], &scheduler, Duration::from_millis(7));
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.upstream_failed,
            vec![
                UpstreamFailedAsset { asset: "b".into(), checks: 2 },
                UpstreamFailedAsset { asset: "c".into(), checks: 0 },
            ]
        );

        let text = summary.render();
        assert!(text.contains("Failed tasks: 1"));
        assert!(text.contains("  - b (and 2 checks)"));
        assert!(text.contains("(after 2 attempts)"));
    }
}
