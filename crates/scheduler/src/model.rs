use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scavbot_core_types::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable task body: a handler kind plus its input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl TaskAction {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub action: TaskAction,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub next_run: DateTime<Utc>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub priority: i32,
    /// Recurring when set; one-shot otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl Task {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.running && now >= self.next_run
    }
}

/// `at` moved forward by `ms`, or `None` when the result leaves the
/// representable time range.
pub fn offset_by_millis(at: DateTime<Utc>, ms: u64) -> Option<DateTime<Utc>> {
    let ms = i64::try_from(ms).ok()?;
    at.checked_add_signed(chrono::Duration::try_milliseconds(ms)?)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// At most one task of this lane runs at a time.
    Exclusive,
    Parallel,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lane::Exclusive => "exclusive",
            Lane::Parallel => "parallel",
        })
    }
}

/// Input to [`crate::Scheduler::schedule_task`].
#[derive(Clone, Debug)]
pub struct ScheduleRequest {
    pub action: TaskAction,
    pub lane: Lane,
    pub priority: i32,
    /// First eligible time; `None` means now.
    pub run_at: Option<DateTime<Utc>>,
    pub interval: Option<Duration>,
}

impl ScheduleRequest {
    pub fn new(action: TaskAction, lane: Lane) -> Self {
        Self {
            action,
            lane,
            priority: 0,
            run_at: None,
            interval: None,
        }
    }

    pub fn exclusive(action: TaskAction) -> Self {
        Self::new(action, Lane::Exclusive)
    }

    pub fn parallel(action: TaskAction) -> Self {
        Self::new(action, Lane::Parallel)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_at = Some(at);
        self
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// A task together with the lane holding it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub lane: Lane,
    #[serde(flatten)]
    pub task: Task,
}
