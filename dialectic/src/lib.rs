//! dialectic - a deterministic, budget-bounded HTN execution engine for
//! discourse analysis.
//!
//! The engine decomposes a single root unit of work (a pre-segmented
//! transcript) into a tree of tasks, resolves each leaf via a registered
//! primitive operator, and accumulates operator side effects as a set of
//! immutable, identity-deduplicated artifacts: atomic claims, argument
//! frames, reference resolutions and diagnostics.
//!
//! # Architecture
//!
//! ```text
//! root Task + DiscourseState
//!         |
//!         v
//! +-------------------+     select (cost, registration order)
//! |    HtnPlanner     |--------------------------------------+
//! |  LIFO task stack  |                                      v
//! |  dedup key set    |                              MethodRegistry
//! |  budget gate      |     decompose -> subtasks    (caller-owned)
//! |  trace recorder   |     execute   -> OperatorResult
//! +-------------------+
//!         |
//!         v
//! DiscourseState mutation + Artifact emission + Trace events
//!         |
//!         v
//!    PlannerResult (the only external output)
//! ```
//!
//! Execution is single-threaded and synchronous. Given the same
//! transcript, budgets and a registry of pure methods, repeated runs
//! yield identical dedup keys, artifact ids and trace event sequences.
//!
//! # Usage
//!
//! ```
//! use dialectic::methods::{default_registry, transcript_root_task};
//! use dialectic::{DiscourseState, HtnPlanner, SpeakerTurn, Span};
//!
//! let text = "Alice: The study found a 40% improvement.";
//! let turns = vec![SpeakerTurn {
//!     speaker: "Alice".to_string(),
//!     text: "The study found a 40% improvement.".to_string(),
//!     span: Span::new(7, 41),
//!     turn_index: 0,
//! }];
//! let mut state = DiscourseState::from_transcript("demo", text, turns);
//!
//! let planner = HtnPlanner::new(default_registry());
//! let result = planner.run(transcript_root_task(text.len()), &mut state);
//!
//! assert!(result.success);
//! assert!(!result.claims().is_empty());
//! ```

pub mod artifact;
pub mod budget;
pub mod canonical;
pub mod error;
pub mod methods;
pub mod planner;
pub mod registry;
pub mod result;
pub mod state;
pub mod task;
pub mod trace;

pub use artifact::{
    ArgumentFrame, Artifact, ArtifactId, ArtifactPayload, AtomicClaim, ClaimType, Diagnostic,
    DiagnosticKind, FrameRole, Provenance, ReferenceKind, ResolutionStatus, ScoredCandidate,
    Severity, TentativeResolution,
};
pub use budget::{BudgetStatus, PlannerBudgets};
pub use error::MethodError;
pub use planner::{HtnPlanner, PlannerConfig};
pub use registry::{Method, MethodRegistry};
pub use result::{OperatorResult, OperatorStatus, PlannerResult, PlannerStats};
pub use state::{DiscourseState, Entity, EntityKind, OpenReference, Scope, ScopeKind, SpeakerTurn};
pub use task::{Span, Task, TaskId};
pub use trace::{TraceEvent, TraceEventKind, TraceRecorder};
