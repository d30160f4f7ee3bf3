//! Append-only trace log of planner activity, for debugging and replay.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;

/// Closed union of planner trace event kinds.
///
/// Given deterministic methods and fixed budgets, the ordered sequence of
/// kinds is identical across repeated runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEventKind {
    MethodSelected,
    TaskDecomposed,
    OperatorExecuted,
    OperatorFailed,
    DedupSkip,
    NoMethod,
    ChildrenTrimmed,
    HardBudgetExceeded,
    SoftBudgetBreached,
}

/// Single trace event capturing one planner step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub timestamp_ms: u64,
    pub task_id: Option<TaskId>,
    pub method: Option<String>,
    pub depth: u32,
    pub data: BTreeMap<String, Value>,
}

impl TraceEvent {
    pub fn new(kind: TraceEventKind) -> Self {
        Self {
            kind,
            timestamp_ms: now_ms(),
            task_id: None,
            method: None,
            depth: 0,
            data: BTreeMap::new(),
        }
    }

    pub fn task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Records trace events during planner execution.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn filter_by_kind(&self, kind: TraceEventKind) -> Vec<&TraceEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn filter_by_task(&self, task_id: &str) -> Vec<&TraceEvent> {
        self.events
            .iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .collect()
    }

    /// Export the full trace as pretty JSON.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filtering_by_kind_and_task() {
        let mut recorder = TraceRecorder::new();
        recorder.log(TraceEvent::new(TraceEventKind::MethodSelected).task("t1"));
        recorder.log(TraceEvent::new(TraceEventKind::DedupSkip).task("t2"));
        recorder.log(TraceEvent::new(TraceEventKind::OperatorExecuted).task("t1"));

        assert_eq!(recorder.filter_by_kind(TraceEventKind::DedupSkip).len(), 1);
        assert_eq!(recorder.filter_by_task("t1").len(), 2);
        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn test_export_uses_screaming_snake_names() {
        let mut recorder = TraceRecorder::new();
        recorder.log(
            TraceEvent::new(TraceEventKind::HardBudgetExceeded).data("reason", json!("TASK_LIMIT")),
        );
        let exported = recorder.export_json().unwrap();
        assert!(exported.contains("HARD_BUDGET_EXCEEDED"));
        assert!(exported.contains("TASK_LIMIT"));
    }

    #[test]
    fn test_clear_empties_the_log() {
        let mut recorder = TraceRecorder::new();
        recorder.log(TraceEvent::new(TraceEventKind::NoMethod));
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
