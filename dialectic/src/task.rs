//! Task definition for the HTN planner.
//!
//! Tasks are either compound (decomposed into subtasks by a method) or
//! primitive (executed directly by an operator). The distinction lives in
//! the registered method, not in the task itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::hex_digest;

/// Identifier for a task (opaque string, content-derived).
pub type TaskId = String;

/// Half-open character interval `[start, end)` into the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True if `other` lies entirely within this span.
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Default per-task time budget in milliseconds.
///
/// Carried on every task but not enforced by the scheduler; the global
/// wall-clock budget is the only time control.
pub const DEFAULT_TASK_BUDGET_MS: u64 = 1000;

/// A task in the HTN task network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    /// Parameter mapping. `BTreeMap` keeps serialization key-sorted, which
    /// the dedup key depends on.
    pub params: BTreeMap<String, Value>,
    pub span: Span,
    pub parent_task_id: Option<TaskId>,
    pub parent_artifact_id: Option<String>,
    /// Root task is depth 0; assigned by the scheduler on push.
    pub depth: u32,
    pub budget_ms: u64,
    /// Content-derived dedup key, computed once at construction.
    ///
    /// A pure function of (task type, span, key-sorted params). Depth,
    /// budget and parent links are deliberately excluded: they can differ
    /// between two logically identical tasks scheduled from different
    /// places, and the key must recognize the repeat.
    dedup_key: String,
}

impl Task {
    /// Create a task. The id is derived from the dedup key, so logically
    /// identical tasks get identical ids on every run.
    pub fn new(task_type: impl Into<String>, params: BTreeMap<String, Value>, span: Span) -> Self {
        let task_type = task_type.into();
        let dedup_key = compute_dedup_key(&task_type, span, &params);
        let id = format!("{}_{}", task_type.to_lowercase(), &dedup_key[..8]);
        Self {
            id,
            task_type,
            params,
            span,
            parent_task_id: None,
            parent_artifact_id: None,
            depth: 0,
            budget_ms: DEFAULT_TASK_BUDGET_MS,
            dedup_key,
        }
    }

    pub fn with_parent_artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.parent_artifact_id = Some(artifact_id.into());
        self
    }

    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = budget_ms;
        self
    }

    pub fn dedup_key(&self) -> &str {
        &self.dedup_key
    }

    /// String parameter accessor.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

fn compute_dedup_key(task_type: &str, span: Span, params: &BTreeMap<String, Value>) -> String {
    // serde_json on a BTreeMap emits keys in sorted order, so the params
    // digest is independent of insertion order.
    let params_json = serde_json::to_string(params).unwrap_or_default();
    let mut params_hash = hex_digest(params_json.as_bytes());
    params_hash.truncate(16);

    let key_material = format!(
        "{{\"params_hash\":\"{}\",\"span\":[{},{}],\"type\":\"{}\"}}",
        params_hash, span.start, span.end, task_type
    );
    let mut key = hex_digest(key_material.as_bytes());
    key.truncate(24);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_span_half_open() {
        let span = Span::new(10, 10);
        assert!(span.is_empty());
        assert_eq!(span.len(), 0);
        assert!(Span::new(5, 20).contains(Span::new(5, 7)));
        assert!(!Span::new(5, 20).contains(Span::new(4, 7)));
    }

    #[test]
    fn test_dedup_key_ignores_mutable_bookkeeping() {
        let p = params(&[("text", json!("claims here"))]);
        let a = Task::new("EXTRACT_CLAIM", p.clone(), Span::new(5, 20));
        let mut b = Task::new("EXTRACT_CLAIM", p, Span::new(5, 20)).with_budget_ms(9999);
        b.depth = 7;
        b.parent_task_id = Some("other".into());
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_varies_with_type_span_and_params() {
        let p = params(&[("k", json!(1))]);
        let base = Task::new("A", p.clone(), Span::new(0, 10));
        assert_ne!(base.dedup_key(), Task::new("B", p.clone(), Span::new(0, 10)).dedup_key());
        assert_ne!(base.dedup_key(), Task::new("A", p, Span::new(0, 11)).dedup_key());
        assert_ne!(
            base.dedup_key(),
            Task::new("A", params(&[("k", json!(2))]), Span::new(0, 10)).dedup_key()
        );
    }

    #[test]
    fn test_dedup_key_param_order_independent() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!(2));
        let mut reverse = BTreeMap::new();
        reverse.insert("b".to_string(), json!(2));
        reverse.insert("a".to_string(), json!(1));
        assert_eq!(
            Task::new("T", forward, Span::new(0, 1)).dedup_key(),
            Task::new("T", reverse, Span::new(0, 1)).dedup_key()
        );
    }

    #[test]
    fn test_task_id_is_deterministic() {
        let p = params(&[("x", json!("y"))]);
        let a = Task::new("PROCESS_TURN", p.clone(), Span::new(3, 9));
        let b = Task::new("PROCESS_TURN", p, Span::new(3, 9));
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("process_turn_"));
    }
}
