//! Default method library: deterministic heuristic methods for
//! transcript decomposition, claim extraction, dialectic structure and
//! reference resolution.
//!
//! These are ordinary `Method` implementations registered through the
//! same registry surface any caller-supplied method uses; nothing here is
//! special to the planner. All methods are pure heuristics - no model
//! calls, no network.

pub mod claim;
pub mod coref;
pub mod decompose;
pub mod dialectic;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::registry::MethodRegistry;
use crate::task::{Span, Task};

/// Task type tags handled by the default library.
pub mod task_types {
    pub const DECOMPOSE_TRANSCRIPT: &str = "DECOMPOSE_TRANSCRIPT";
    pub const PROCESS_TURN: &str = "PROCESS_TURN";
    pub const REGISTER_SPEAKER_ENTITY: &str = "REGISTER_SPEAKER_ENTITY";
    pub const PUSH_SCOPE: &str = "PUSH_SCOPE";
    pub const POP_SCOPE: &str = "POP_SCOPE";
    pub const DETECT_DIALECTIC_RELATION: &str = "DETECT_DIALECTIC_RELATION";
    pub const BUILD_ARGUMENT_FRAME: &str = "BUILD_ARGUMENT_FRAME";
    pub const EXTRACT_CLAIMS_FROM_SEGMENT: &str = "EXTRACT_CLAIMS_FROM_SEGMENT";
    pub const EXTRACT_ATOMIC_CLAIM: &str = "EXTRACT_ATOMIC_CLAIM";
    pub const DETECT_REFERENCES: &str = "DETECT_REFERENCES";
    pub const RESOLVE_REFERENCE: &str = "RESOLVE_REFERENCE";
    pub const FINALIZE_FRAME: &str = "FINALIZE_FRAME";
}

/// Registry with the full default library in its canonical registration
/// order.
pub fn default_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register(Arc::new(decompose::DecomposeTranscript));
    registry.register(Arc::new(decompose::ProcessTurn));
    registry.register(Arc::new(decompose::PushScope));
    registry.register(Arc::new(decompose::PopScope));
    registry.register(Arc::new(coref::RegisterSpeakerEntity));
    registry.register(Arc::new(dialectic::BuildArgumentFrame));
    registry.register(Arc::new(dialectic::DetectDialecticRelation));
    registry.register(Arc::new(dialectic::FinalizeFrame));
    registry.register(Arc::new(claim::ExtractClaimsFromSegment));
    registry.register(Arc::new(claim::ExtractAtomicClaim));
    registry.register(Arc::new(coref::DetectReferences));
    registry.register(Arc::new(coref::ResolveReference::default()));
    registry
}

/// Root task covering the whole transcript, the conventional entry point
/// for the default library.
pub fn transcript_root_task(transcript_len: usize) -> Task {
    Task::new(
        task_types::DECOMPOSE_TRANSCRIPT,
        BTreeMap::new(),
        Span::new(0, transcript_len),
    )
}

/// Cost scheme shared by the default library: a per-method base plus the
/// task depth, matching selection pressure toward shallow work.
pub(crate) fn scaled_cost(base: f64, task: &Task) -> f64 {
    base + f64::from(task.depth)
}

/// Trimmed slice with its absolute offset, or None when all whitespace.
pub(crate) fn trimmed_with_offset(offset: usize, s: &str) -> Option<(usize, &str)> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = s.len() - s.trim_start().len();
    Some((offset + lead, trimmed))
}

/// Shorthand for the `{"turn_index": n, "speaker": s}` parameter shape
/// used throughout turn processing.
pub(crate) fn turn_params(turn_index: usize, speaker: &str) -> BTreeMap<String, serde_json::Value> {
    let mut params = BTreeMap::new();
    params.insert("turn_index".to_string(), json!(turn_index));
    params.insert("speaker".to_string(), json!(speaker));
    params
}
