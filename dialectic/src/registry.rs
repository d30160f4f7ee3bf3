//! Method contract and registry.
//!
//! A method is the engine's only extension point. It is *compound* when
//! `decompose` returns one or more subtasks and *primitive* when it always
//! returns none, which signals that `execute` must be invoked instead; no
//! method plays both roles for the same task instance.
//!
//! The registry is a plain, explicitly constructed table from task type to
//! candidate methods in registration order — never global mutable state —
//! so a run can be handed a custom registry (e.g. stub methods in tests)
//! without touching anything process-wide.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MethodError;
use crate::result::OperatorResult;
use crate::state::DiscourseState;
use crate::task::Task;

/// A registered handler for one task type.
pub trait Method: Send + Sync {
    /// Display name used in traces, provenance and method paths.
    fn name(&self) -> &'static str;

    /// The single task type this method registers against.
    fn task_type(&self) -> &'static str;

    /// True if the method is applicable in the current state.
    fn preconditions(&self, state: &DiscourseState, task: &Task) -> bool;

    /// Dynamic cost for method selection; lowest applicable cost wins,
    /// ties broken by registration order.
    fn cost(&self, state: &DiscourseState, task: &Task) -> f64;

    /// Subtasks for a compound method; empty for primitives.
    fn decompose(&self, state: &DiscourseState, task: &Task) -> Vec<Task>;

    /// Execute a primitive operator. Only called when `decompose`
    /// returned no subtasks.
    fn execute(
        &self,
        _state: &mut DiscourseState,
        _task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        Err(MethodError::NotPrimitive(self.name().to_string()))
    }

    /// True if `execute` consumes external model budget; drives the soft
    /// model-call and token advisories.
    fn uses_model(&self) -> bool {
        false
    }
}

/// Lookup from task type to candidate methods in registration order.
///
/// Registration order is significant: it is the deterministic tie-breaker
/// when two applicable methods report equal cost.
#[derive(Default, Clone)]
pub struct MethodRegistry {
    methods: HashMap<String, Vec<Arc<dyn Method>>>,
    registered: usize,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: Arc<dyn Method>) {
        self.methods
            .entry(method.task_type().to_string())
            .or_default()
            .push(method);
        self.registered += 1;
    }

    /// Candidate methods for a task type, in registration order.
    pub fn methods_for(&self, task_type: &str) -> &[Arc<dyn Method>] {
        self.methods.get(task_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Task types with at least one registered method, sorted.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("task_types", &self.task_types())
            .field("registered", &self.registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Stub {
        name: &'static str,
        task_type: &'static str,
    }

    impl Method for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn task_type(&self) -> &'static str {
            self.task_type
        }
        fn preconditions(&self, _: &DiscourseState, _: &Task) -> bool {
            true
        }
        fn cost(&self, _: &DiscourseState, _: &Task) -> f64 {
            1.0
        }
        fn decompose(&self, _: &DiscourseState, _: &Task) -> Vec<Task> {
            Vec::new()
        }
    }

    #[test]
    fn test_registration_order_preserved_per_type() {
        let mut registry = MethodRegistry::new();
        registry.register(Arc::new(Stub { name: "first", task_type: "T" }));
        registry.register(Arc::new(Stub { name: "second", task_type: "T" }));
        registry.register(Arc::new(Stub { name: "other", task_type: "U" }));

        let names: Vec<_> = registry.methods_for("T").iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.task_types(), vec!["T", "U"]);
    }

    #[test]
    fn test_unknown_type_has_no_candidates() {
        let registry = MethodRegistry::new();
        assert!(registry.methods_for("MISSING").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_default_execute_faults_for_compound() {
        let stub = Stub { name: "compound", task_type: "T" };
        let mut state = DiscourseState::default();
        let task = Task::new("T", BTreeMap::new(), crate::task::Span::new(0, 1));
        let err = stub.execute(&mut state, &task).unwrap_err();
        assert!(err.to_string().contains("compound"));
    }
}
