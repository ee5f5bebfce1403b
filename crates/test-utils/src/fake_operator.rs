use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::Barrier;

use assetdag::dag::TaskInstance;
use assetdag::exec::{ExecutionContext, Operator, OperatorFuture};

/// What the fake operator does for a given instance.
#[derive(Clone)]
pub enum Behaviour {
    Succeed,
    Fail,
    /// Fail the first `n` attempts, then succeed.
    FailTimes(u32),
    /// Sleep, then succeed.
    Delay(Duration),
    /// Wait until every party reached the barrier, then succeed.
    Barrier(Arc<Barrier>),
    /// Block until the run is cancelled, then fail.
    UntilCancelled,
    /// Panic inside the operator.
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Started(String),
    Ended(String),
}

#[derive(Default)]
struct LogInner {
    events: Vec<LogEvent>,
    attempts: HashMap<String, u32>,
    running: usize,
    max_running: usize,
}

/// Shared record of what a fake operator executed, and in which order.
#[derive(Clone, Default)]
pub struct ExecutionLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ExecutionLog {
    fn start(&self, id: &str) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push(LogEvent::Started(id.to_string()));
        inner.running += 1;
        inner.max_running = inner.max_running.max(inner.running);
        let attempts = inner.attempts.entry(id.to_string()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    fn end(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push(LogEvent::Ended(id.to_string()));
        inner.running -= 1;
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Instance ids in the order their first attempt started.
    pub fn started(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for e in self.events() {
            if let LogEvent::Started(id) = e {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
        }
        seen
    }

    pub fn was_started(&self, id: &str) -> bool {
        self.started().iter().any(|s| s == id)
    }

    /// Position of the first `Started(id)` event.
    pub fn start_index(&self, id: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| *e == LogEvent::Started(id.to_string()))
    }

    /// Position of the last `Ended(id)` event.
    pub fn end_index(&self, id: &str) -> Option<usize> {
        self.events()
            .iter()
            .rposition(|e| *e == LogEvent::Ended(id.to_string()))
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().unwrap().max_running
    }
}

/// An operator that:
/// - records every attempt in an [`ExecutionLog`]
/// - behaves per instance human id, `Succeed` by default
#[derive(Clone, Default)]
pub struct FakeOperator {
    log: ExecutionLog,
    behaviours: HashMap<String, Behaviour>,
}

impl FakeOperator {
    pub fn new(log: ExecutionLog) -> Self {
        Self {
            log,
            behaviours: HashMap::new(),
        }
    }

    pub fn on(mut self, human_id: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(human_id.to_string(), behaviour);
        self
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }
}

impl Operator for FakeOperator {
    fn run<'a>(&'a self, ctx: &'a ExecutionContext, instance: &'a TaskInstance) -> OperatorFuture<'a> {
        Box::pin(async move {
            let id = instance.human_id();
            let attempt = self.log.start(id);
            let behaviour = self
                .behaviours
                .get(id)
                .cloned()
                .unwrap_or(Behaviour::Succeed);

            let outcome = match behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(anyhow!("{id} failed")),
                Behaviour::FailTimes(n) if attempt <= n => {
                    Err(anyhow!("{id} failed on attempt {attempt}"))
                }
                Behaviour::FailTimes(_) => Ok(()),
                Behaviour::Delay(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
                Behaviour::Barrier(barrier) => {
                    barrier.wait().await;
                    Ok(())
                }
                Behaviour::Panic => panic!("{id} blew up"),
                Behaviour::UntilCancelled => {
                    let mut cancel = ctx.cancel.clone();
                    cancel.cancelled().await;
                    Err(anyhow!("{id} interrupted"))
                }
            };

            self.log.end(id);
            outcome
        })
    }
}
