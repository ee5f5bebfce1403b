// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Status of a single task instance within one run.
///
/// Legal transitions:
/// - `Pending -> Queued -> Running -> Succeeded | Failed`
/// - `Pending -> Skipped`
/// - `Pending -> UpstreamFailed`
///
/// `Succeeded`, `Failed`, `UpstreamFailed` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Never ran because something it depends on failed.
    UpstreamFailed,
    /// Deliberately excluded from this run; treated as already satisfied.
    Skipped,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Succeeded | Status::Failed | Status::UpstreamFailed | Status::Skipped
        )
    }

    /// Whether this status lets a dependent instance start.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Status::Succeeded | Status::Skipped)
    }

    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;

        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Skipped)
                | (Pending, UpstreamFailed)
                | (Queued, Running)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::UpstreamFailed => "upstream_failed",
            Status::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "queued" => Ok(Status::Queued),
            "running" => Ok(Status::Running),
            "succeeded" => Ok(Status::Succeeded),
            "failed" => Ok(Status::Failed),
            "upstream_failed" => Ok(Status::UpstreamFailed),
            "skipped" => Ok(Status::Skipped),
            other => Err(format!("invalid status: {other}")),
        }
    }
}

/// Which phase of an asset a task instance represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKind {
    Main,
    ColumnCheck,
    CustomCheck,
    MetadataPush,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 4] = [
        InstanceKind::Main,
        InstanceKind::ColumnCheck,
        InstanceKind::CustomCheck,
        InstanceKind::MetadataPush,
    ];

    pub fn is_check(self) -> bool {
        matches!(self, InstanceKind::ColumnCheck | InstanceKind::CustomCheck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceKind::Main => "main",
            InstanceKind::ColumnCheck => "column_check",
            InstanceKind::CustomCheck => "custom_check",
            InstanceKind::MetadataPush => "metadata_push",
        }
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector / task kind of an asset, e.g. `"bq.sql"`, `"shell"`, `"empty"`.
///
/// Kept as an open string so new backends can be registered without touching
/// the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct AssetType(String);

impl AssetType {
    pub const EMPTY: &'static str = "empty";
    pub const SHELL: &'static str = "shell";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Restricts a run to one phase of every asset (`--only`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OnlyFilter {
    /// Run only the main asset executions, skip checks and metadata push.
    Main,
    /// Run only column and custom checks.
    Checks,
    /// Run only metadata push.
    PushMetadata,
}

impl OnlyFilter {
    /// Instance kinds that should be skipped under this filter.
    pub fn excluded_kinds(self) -> &'static [InstanceKind] {
        match self {
            OnlyFilter::Main => &[
                InstanceKind::ColumnCheck,
                InstanceKind::CustomCheck,
                InstanceKind::MetadataPush,
            ],
            OnlyFilter::Checks => &[InstanceKind::Main, InstanceKind::MetadataPush],
            OnlyFilter::PushMetadata => &[
                InstanceKind::Main,
                InstanceKind::ColumnCheck,
                InstanceKind::CustomCheck,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_legal_transitions_are_allowed() {
        assert!(Status::Pending.can_transition_to(Status::Queued));
        assert!(Status::Queued.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Failed));
        assert!(Status::Pending.can_transition_to(Status::UpstreamFailed));

        assert!(!Status::Pending.can_transition_to(Status::Running));
        assert!(!Status::Succeeded.can_transition_to(Status::Pending));
        assert!(!Status::Queued.can_transition_to(Status::Skipped));
        assert!(!Status::Failed.can_transition_to(Status::Succeeded));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            Status::Pending,
            Status::Queued,
            Status::Running,
            Status::Succeeded,
            Status::Failed,
            Status::UpstreamFailed,
            Status::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn skipped_satisfies_dependents_but_failed_does_not() {
        assert!(Status::Skipped.satisfies_dependents());
        assert!(Status::Succeeded.satisfies_dependents());
        assert!(!Status::Failed.satisfies_dependents());
        assert!(!Status::UpstreamFailed.satisfies_dependents());
    }
}
