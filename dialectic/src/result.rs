//! Operator results and the planner's output envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactId, DiagnosticKind};
use crate::state::reference::{OpenReference, RefId};
use crate::trace::TraceEvent;

/// Status of a primitive operator execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorStatus {
    Success,
    /// Recoverable at the task level: the branch is dropped.
    Failed,
    /// Reserved for operators awaiting an external resource; handled
    /// identically to `Failed` until suspension points exist.
    Blocked,
    /// Preconditions were invalidated between selection and execution.
    Skipped,
}

/// Result of a primitive operator execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorResult {
    pub status: OperatorStatus,
    pub artifacts_emitted: Vec<ArtifactId>,
    /// Human-readable descriptions of blackboard mutations.
    pub state_mutations: Vec<String>,
    pub error: Option<String>,
}

impl OperatorResult {
    pub fn success() -> Self {
        Self {
            status: OperatorStatus::Success,
            artifacts_emitted: Vec::new(),
            state_mutations: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OperatorStatus::Failed,
            artifacts_emitted: Vec::new(),
            state_mutations: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: OperatorStatus::Skipped,
            artifacts_emitted: Vec::new(),
            state_mutations: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn with_artifact(mut self, id: impl Into<ArtifactId>) -> Self {
        self.artifacts_emitted.push(id.into());
        self
    }

    pub fn with_mutation(mut self, description: impl Into<String>) -> Self {
        self.state_mutations.push(description.into());
        self
    }
}

/// Execution statistics for one planner run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerStats {
    pub tasks_executed: u32,
    pub model_calls: u32,
    pub model_tokens: u64,
    pub backtracks: u32,
    pub elapsed_ms: u64,
}

/// The single externally-visible output of a planner run.
///
/// Contains everything downstream consumers may read; the internal task
/// stream and stack are never exposed past this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResult {
    /// False only when a hard budget halted the run.
    pub success: bool,
    /// Every emitted artifact, insertion order preserved.
    pub artifacts: Vec<Artifact>,
    /// Resolved reference id -> artifact id of its resolution record.
    pub resolved_references: BTreeMap<RefId, ArtifactId>,
    pub unresolved_references: Vec<OpenReference>,
    pub trace: Vec<TraceEvent>,
    pub stats: PlannerStats,
}

impl PlannerResult {
    /// Ordered claim artifacts.
    pub fn claims(&self) -> Vec<&Artifact> {
        self.artifacts.iter().filter(|a| a.as_claim().is_some()).collect()
    }

    /// Ordered argument frame artifacts.
    pub fn frames(&self) -> Vec<&Artifact> {
        self.artifacts.iter().filter(|a| a.as_frame().is_some()).collect()
    }

    /// Ordered resolution artifacts.
    pub fn resolutions(&self) -> Vec<&Artifact> {
        self.artifacts.iter().filter(|a| a.as_resolution().is_some()).collect()
    }

    /// Ordered diagnostic artifacts, optionally filtered by kind.
    pub fn diagnostics(&self, kind: Option<DiagnosticKind>) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| match a.as_diagnostic() {
                Some(d) => kind.map_or(true, |k| d.kind == k),
                None => false,
            })
            .collect()
    }

    pub fn get_artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }
}
