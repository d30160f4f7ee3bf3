//! HTN planner: stack-based, depth-first, total-order task execution.
//!
//! The scheduler pops tasks from an explicit LIFO stack, selects the
//! cheapest applicable method for each (registration order breaks ties),
//! decomposes compound tasks and executes primitives. Hard budgets are
//! evaluated once per iteration and halt the run with a partial result;
//! soft budgets only produce advisories. A single task's failure can
//! never abort the run.
//!
//! Execution is single-threaded and synchronous. Given the same input,
//! budgets and a registry of pure methods, repeated runs produce
//! identical dedup keys, artifact ids and trace event sequences.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::artifact::{Artifact, ArtifactPayload, Diagnostic, DiagnosticKind, Provenance, Severity};
use crate::budget::{BudgetStatus, PlannerBudgets};
use crate::registry::{Method, MethodRegistry};
use crate::result::{OperatorResult, OperatorStatus, PlannerResult, PlannerStats};
use crate::state::DiscourseState;
use crate::task::Task;
use crate::trace::{TraceEvent, TraceEventKind, TraceRecorder};

/// Configuration for one planner instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub budgets: PlannerBudgets,
    /// When false, the result carries an empty trace.
    pub include_trace: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            budgets: PlannerBudgets::default(),
            include_trace: true,
        }
    }
}

impl PlannerConfig {
    /// Load a config from a TOML document; missing keys take defaults.
    pub fn from_toml_str(doc: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(doc)
    }
}

/// Per-run mutable scheduler state, private to one `run` call.
struct RunState {
    stack: Vec<Task>,
    seen_dedup_keys: HashSet<String>,
    backtracks: u32,
    started: Instant,
    trace: TraceRecorder,
    success: bool,
}

/// Stack-based HTN planner.
pub struct HtnPlanner {
    registry: MethodRegistry,
    config: PlannerConfig,
}

impl HtnPlanner {
    pub fn new(registry: MethodRegistry) -> Self {
        Self::with_config(registry, PlannerConfig::default())
    }

    pub fn with_config(registry: MethodRegistry, config: PlannerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Execute HTN planning from a root task.
    ///
    /// The state is mutated in place by operators; its output fields are
    /// copied into the returned result. Faults inside operators never
    /// escape this call.
    pub fn run(&self, root: Task, state: &mut DiscourseState) -> PlannerResult {
        let mut run = RunState {
            stack: vec![root],
            seen_dedup_keys: HashSet::new(),
            backtracks: 0,
            started: Instant::now(),
            trace: TraceRecorder::new(),
            success: true,
        };

        while let Some(task) = self.next_task(&mut run, state) {
            // Dedup: logically repeated work is recognized and skipped.
            let key = task.dedup_key().to_string();
            if run.seen_dedup_keys.contains(&key) {
                run.trace.log(
                    TraceEvent::new(TraceEventKind::DedupSkip)
                        .task(task.id.clone())
                        .depth(task.depth)
                        .data("task_type", json!(task.task_type))
                        .data("key", json!(key)),
                );
                continue;
            }
            run.seen_dedup_keys.insert(key);

            let Some(method) = self.select_method(state, &task) else {
                self.handle_no_method(&mut run, state, &task);
                continue;
            };

            state.record_method(&task.id, method.name(), task.parent_task_id.as_deref());
            run.trace.log(
                TraceEvent::new(TraceEventKind::MethodSelected)
                    .task(task.id.clone())
                    .method(method.name())
                    .depth(task.depth),
            );

            // Remaining capacity is measured before this execution is
            // counted, so exhaustion leaves work on the stack for the
            // hard task-limit check to report instead of being silently
            // truncated into an apparent success.
            let remaining = self.config.budgets.remaining_tasks(state.tasks_executed) as usize;
            let subtasks = method.decompose(state, &task);
            state.tasks_executed += 1;

            if subtasks.is_empty() {
                self.execute_primitive(&mut run, state, &task, method.as_ref());
            } else {
                self.push_subtasks(&mut run, &task, method.name(), subtasks, remaining);
            }
        }

        self.collect_results(run, state)
    }

    /// Gate one iteration on the hard budgets, then pop the next task.
    fn next_task(&self, run: &mut RunState, state: &mut DiscourseState) -> Option<Task> {
        if run.stack.is_empty() {
            return None;
        }
        let elapsed_ms = run.started.elapsed().as_millis() as u64;
        let status = self.config.budgets.check_hard(state.tasks_executed, elapsed_ms);
        if status != BudgetStatus::Ok {
            self.halt_on_budget(run, state, status, elapsed_ms);
            return None;
        }
        run.stack.pop()
    }

    /// Lowest-cost applicable method; ties go to the first registered.
    fn select_method(&self, state: &DiscourseState, task: &Task) -> Option<Arc<dyn Method>> {
        let mut best: Option<(f64, Arc<dyn Method>)> = None;
        for method in self.registry.methods_for(&task.task_type) {
            if !method.preconditions(state, task) {
                continue;
            }
            let cost = method.cost(state, task);
            let improves = match &best {
                Some((best_cost, _)) => cost < *best_cost,
                None => true,
            };
            if improves {
                best = Some((cost, Arc::clone(method)));
            }
        }
        best.map(|(_, method)| method)
    }

    /// Clamp, stamp and push subtasks so they pop in declared order.
    fn push_subtasks(
        &self,
        run: &mut RunState,
        parent: &Task,
        method_name: &str,
        mut subtasks: Vec<Task>,
        remaining: usize,
    ) {
        let budgets = &self.config.budgets;

        // Truncation keeps the first N: the policy favors earlier-declared
        // subtasks.
        if subtasks.len() > budgets.max_children_per_task {
            run.trace.log(
                TraceEvent::new(TraceEventKind::ChildrenTrimmed)
                    .task(parent.id.clone())
                    .data("requested", json!(subtasks.len()))
                    .data("allowed", json!(budgets.max_children_per_task)),
            );
            subtasks.truncate(budgets.max_children_per_task);
        }

        // Subtasks that would exceed the depth bound are never pushed.
        if parent.depth + 1 > budgets.max_depth {
            subtasks.clear();
        }

        if subtasks.len() > remaining {
            subtasks.truncate(remaining);
        }

        run.trace.log(
            TraceEvent::new(TraceEventKind::TaskDecomposed)
                .task(parent.id.clone())
                .method(method_name)
                .depth(parent.depth)
                .data("subtask_count", json!(subtasks.len())),
        );

        // Pushed in reverse so LIFO popping processes them left to right.
        for mut subtask in subtasks.into_iter().rev() {
            subtask.depth = parent.depth + 1;
            subtask.parent_task_id = Some(parent.id.clone());
            run.stack.push(subtask);
        }
    }

    /// Execute a primitive operator with precondition re-check and fault
    /// absorption. This is the only place a method fault is converted.
    fn execute_primitive(
        &self,
        run: &mut RunState,
        state: &mut DiscourseState,
        task: &Task,
        method: &dyn Method,
    ) {
        // State may have changed since selection; the re-check is the
        // defensive guard for method re-entry.
        let result = if !method.preconditions(state, task) {
            OperatorResult::skipped("preconditions invalidated before execution")
        } else {
            match method.execute(state, task) {
                Ok(result) => result,
                Err(fault) => OperatorResult::failed(fault.to_string()),
            }
        };

        match result.status {
            // No suspension points exist: BLOCKED degrades to FAILED.
            OperatorStatus::Failed | OperatorStatus::Blocked => {
                self.handle_operator_failure(run, state, task, method.name(), &result);
            }
            OperatorStatus::Success | OperatorStatus::Skipped => {
                run.trace.log(
                    TraceEvent::new(TraceEventKind::OperatorExecuted)
                        .task(task.id.clone())
                        .method(method.name())
                        .depth(task.depth)
                        .data("status", json!(result.status))
                        .data("artifacts", json!(result.artifacts_emitted))
                        .data("mutations", json!(result.state_mutations)),
                );
            }
        }

        if method.uses_model() {
            self.check_soft_model_budgets(run, state);
        }
    }

    /// A failed operator drops its branch: no rollback, no alternate
    /// method retry. The backtrack counter is advisory.
    fn handle_operator_failure(
        &self,
        run: &mut RunState,
        state: &mut DiscourseState,
        task: &Task,
        method_name: &str,
        result: &OperatorResult,
    ) {
        run.backtracks += 1;
        let error = result.error.clone().unwrap_or_else(|| "operator failed".to_string());
        warn!(task_id = %task.id, method = method_name, %error, "operator failed");

        run.trace.log(
            TraceEvent::new(TraceEventKind::OperatorFailed)
                .task(task.id.clone())
                .method(method_name)
                .depth(task.depth)
                .data("error", json!(error))
                .data("backtracks", json!(run.backtracks)),
        );

        state.emit_artifact(Artifact::new(
            format!("diag_operator_failed_{}", task.id),
            Provenance::new(task.id.clone(), method_name),
            ArtifactPayload::Diagnostic(
                Diagnostic::new(
                    DiagnosticKind::OperatorFailed,
                    format!("operator {} failed: {}", method_name, error),
                    Severity::Warning,
                )
                .with_context("task_type", json!(task.task_type)),
            ),
        ));

        if run.backtracks >= self.config.budgets.max_backtracks {
            run.trace.log(
                TraceEvent::new(TraceEventKind::SoftBudgetBreached)
                    .data("budget", json!("backtracks"))
                    .data("count", json!(run.backtracks))
                    .data("limit", json!(self.config.budgets.max_backtracks)),
            );
            // Advisory only; the idempotent store keeps it to one artifact.
            state.emit_artifact(Artifact::new(
                "diag_soft_backtracks",
                Provenance::new(task.id.clone(), method_name),
                ArtifactPayload::Diagnostic(
                    Diagnostic::new(
                        DiagnosticKind::SoftBudgetExceeded,
                        format!("backtrack limit reached ({})", self.config.budgets.max_backtracks),
                        Severity::Warning,
                    )
                    .with_context("status", json!(BudgetStatus::BacktrackLimit)),
                ),
            ));
        }
    }

    /// No registered method's preconditions held: record and drop.
    fn handle_no_method(&self, run: &mut RunState, state: &mut DiscourseState, task: &Task) {
        debug!(task_id = %task.id, task_type = %task.task_type, "no applicable method");
        run.trace.log(
            TraceEvent::new(TraceEventKind::NoMethod)
                .task(task.id.clone())
                .depth(task.depth)
                .data("task_type", json!(task.task_type)),
        );
        state.emit_artifact(Artifact::new(
            format!("diag_no_method_{}", task.id),
            Provenance {
                created_by_task: Some(task.id.clone()),
                created_by_method: None,
            },
            ArtifactPayload::Diagnostic(
                Diagnostic::new(
                    DiagnosticKind::NoApplicableMethod,
                    format!("no applicable method for task type {}", task.task_type),
                    Severity::Error,
                )
                .with_context("task_type", json!(task.task_type))
                .with_context("params", json!(task.params)),
            ),
        ));
    }

    /// Advisory checks on the external-call counters.
    fn check_soft_model_budgets(&self, run: &mut RunState, state: &mut DiscourseState) {
        let budgets = &self.config.budgets;
        if state.model_calls > budgets.max_model_calls {
            run.trace.log(
                TraceEvent::new(TraceEventKind::SoftBudgetBreached)
                    .data("budget", json!("model_calls"))
                    .data("current", json!(state.model_calls))
                    .data("limit", json!(budgets.max_model_calls)),
            );
            state.emit_artifact(soft_budget_diagnostic(
                "diag_soft_model_calls",
                format!("model call budget exceeded ({} limit)", budgets.max_model_calls),
            ));
        }
        if state.model_tokens > budgets.max_model_tokens {
            run.trace.log(
                TraceEvent::new(TraceEventKind::SoftBudgetBreached)
                    .data("budget", json!("model_tokens"))
                    .data("current", json!(state.model_tokens))
                    .data("limit", json!(budgets.max_model_tokens)),
            );
            state.emit_artifact(soft_budget_diagnostic(
                "diag_soft_model_tokens",
                format!("model token budget exceeded ({} limit)", budgets.max_model_tokens),
            ));
        }
    }

    /// A hard budget tripped: one diagnostic naming the limit, then a
    /// graceful partial completion.
    fn halt_on_budget(
        &self,
        run: &mut RunState,
        state: &mut DiscourseState,
        status: BudgetStatus,
        elapsed_ms: u64,
    ) {
        warn!(status = status.as_str(), "hard budget exceeded, halting run");
        run.success = false;
        state.emit_artifact(Artifact::new(
            format!("diag_budget_{}", status.as_str()),
            Provenance::default(),
            ArtifactPayload::Diagnostic(
                Diagnostic::new(
                    DiagnosticKind::HardBudgetExceeded,
                    format!("hard budget exceeded: {}", status.as_str()),
                    Severity::Error,
                )
                .with_context("status", json!(status))
                .with_context("tasks_executed", json!(state.tasks_executed))
                .with_context("elapsed_ms", json!(elapsed_ms)),
            ),
        ));
        run.trace.log(
            TraceEvent::new(TraceEventKind::HardBudgetExceeded)
                .data("status", json!(status))
                .data("tasks_executed", json!(state.tasks_executed)),
        );
    }

    /// Copy the state's output fields into the result envelope.
    fn collect_results(&self, run: RunState, state: &DiscourseState) -> PlannerResult {
        PlannerResult {
            success: run.success,
            artifacts: state.collect_artifacts(),
            resolved_references: state.resolved_references().clone(),
            unresolved_references: state.open_references().to_vec(),
            trace: if self.config.include_trace {
                run.trace.into_events()
            } else {
                Vec::new()
            },
            stats: PlannerStats {
                tasks_executed: state.tasks_executed,
                model_calls: state.model_calls,
                model_tokens: state.model_tokens,
                backtracks: run.backtracks,
                elapsed_ms: run.started.elapsed().as_millis() as u64,
            },
        }
    }
}

fn soft_budget_diagnostic(id: &str, message: String) -> Artifact {
    Artifact::new(
        id,
        Provenance::default(),
        ArtifactPayload::Diagnostic(Diagnostic::new(
            DiagnosticKind::SoftBudgetExceeded,
            message,
            Severity::Warning,
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::task::Span;

    struct CostedStub {
        name: &'static str,
        cost: f64,
        executions: Arc<AtomicU32>,
    }

    impl Method for CostedStub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn task_type(&self) -> &'static str {
            "STUB"
        }
        fn preconditions(&self, _: &DiscourseState, _: &Task) -> bool {
            true
        }
        fn cost(&self, _: &DiscourseState, _: &Task) -> f64 {
            self.cost
        }
        fn decompose(&self, _: &DiscourseState, _: &Task) -> Vec<Task> {
            Vec::new()
        }
        fn execute(
            &self,
            _: &mut DiscourseState,
            _: &Task,
        ) -> Result<OperatorResult, crate::error::MethodError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(OperatorResult::success())
        }
    }

    fn stub_registry(specs: &[(&'static str, f64)]) -> (MethodRegistry, Vec<Arc<AtomicU32>>) {
        let mut registry = MethodRegistry::new();
        let mut counters = Vec::new();
        for &(name, cost) in specs {
            let counter = Arc::new(AtomicU32::new(0));
            counters.push(Arc::clone(&counter));
            registry.register(Arc::new(CostedStub {
                name,
                cost,
                executions: counter,
            }));
        }
        (registry, counters)
    }

    fn stub_task() -> Task {
        Task::new("STUB", BTreeMap::new(), Span::new(0, 10))
    }

    #[test]
    fn test_minimum_cost_method_wins() {
        let (registry, counters) = stub_registry(&[("expensive", 10.0), ("cheap", 2.0)]);
        let planner = HtnPlanner::new(registry);
        let mut state = DiscourseState::default();
        let result = planner.run(stub_task(), &mut state);
        assert!(result.success);
        assert_eq!(counters[0].load(Ordering::SeqCst), 0);
        assert_eq!(counters[1].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_equal_cost_tie_goes_to_first_registered() {
        let (registry, counters) = stub_registry(&[("first", 5.0), ("second", 5.0)]);
        let planner = HtnPlanner::new(registry);
        let mut state = DiscourseState::default();
        planner.run(stub_task(), &mut state);
        assert_eq!(counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(counters[1].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_method_emits_diagnostic_and_continues() {
        let planner = HtnPlanner::new(MethodRegistry::new());
        let mut state = DiscourseState::default();
        let result = planner.run(stub_task(), &mut state);
        assert!(result.success);
        assert_eq!(result.diagnostics(Some(DiagnosticKind::NoApplicableMethod)).len(), 1);
        assert_eq!(result.stats.tasks_executed, 0);
    }

    #[test]
    fn test_config_from_toml() {
        let config = PlannerConfig::from_toml_str(
            "include_trace = false\n\n[budgets]\nmax_tasks = 7\n",
        )
        .unwrap();
        assert!(!config.include_trace);
        assert_eq!(config.budgets.max_tasks, 7);
        assert_eq!(config.budgets.max_depth, PlannerBudgets::default().max_depth);
    }
}
