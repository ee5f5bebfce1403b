// src/exec/context.rs

//! Parameters shared by every operator call in one run.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::engine::CancelSignal;
use crate::errors::{AssetdagError, Result};
use crate::pipeline::EnvironmentSection;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run-wide values handed to operators.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    /// Selected `[environment.<name>]`, if any.
    pub environment: Option<String>,
    /// Variables exported to shell commands.
    pub variables: BTreeMap<String, String>,
    pub cancel: CancelSignal,
}

impl ExecutionContext {
    pub fn new(start_date: NaiveDateTime, end_date: NaiveDateTime) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_date,
            end_date,
            environment: None,
            variables: BTreeMap::new(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_environment(mut self, name: &str, env: &EnvironmentSection) -> Self {
        self.environment = Some(name.to_string());
        self.variables = env.variables.clone();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn start_date_str(&self) -> String {
        self.start_date.format(DATETIME_FORMAT).to_string()
    }

    pub fn end_date_str(&self) -> String {
        self.end_date.format(DATETIME_FORMAT).to_string()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(default_start_date(), default_end_date())
    }
}

/// Yesterday at midnight.
pub fn default_start_date() -> NaiveDateTime {
    let today = Local::now().date_naive();
    (today - ChronoDuration::days(1)).and_time(NaiveTime::MIN)
}

/// Today at midnight.
pub fn default_end_date() -> NaiveDateTime {
    Local::now().date_naive().and_time(NaiveTime::MIN)
}

/// Accepts `YYYY-MM-DD` (midnight) or `YYYY-MM-DD HH:MM:SS`.
pub fn parse_date(input: &str) -> Result<NaiveDateTime> {
    let input = input.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(input, DATETIME_FORMAT) {
        return Ok(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Ok(d.and_time(NaiveTime::MIN));
    }

    Err(AssetdagError::ConfigError(format!(
        "invalid date '{input}': expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_forms() {
        let d = parse_date("2024-03-01").unwrap();
        assert_eq!(d.to_string(), "2024-03-01 00:00:00");

        let dt = parse_date(" 2024-03-01 13:45:00 ").unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 13:45:00");

        assert!(matches!(
            parse_date("03/01/2024"),
            Err(AssetdagError::ConfigError(_))
        ));
    }

    #[test]
    fn default_window_is_one_day() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.end_date - ctx.start_date, ChronoDuration::days(1));
        assert_eq!(ctx.start_date.time(), NaiveTime::MIN);
    }

    #[test]
    fn environment_variables_are_copied() {
        let mut env = EnvironmentSection::default();
        env.variables.insert("SCHEMA".into(), "dev".into());

        let ctx = ExecutionContext::default().with_environment("dev", &env);
        assert_eq!(ctx.environment.as_deref(), Some("dev"));
        assert_eq!(ctx.variables.get("SCHEMA").map(String::as_str), Some("dev"));
    }
}
