//! Discourse State: the mutable blackboard threaded through a planner run.
//!
//! Operators read and mutate this directly. Input fields are immutable
//! after construction; working memory is freely mutable; the artifact
//! store is append-only and idempotent by id. One state instance exists
//! per run and its output fields are copied into the Planner Result when
//! the run ends.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::{Artifact, ArtifactId, FrameRole};
use crate::canonical::entity_dedup_key;
use crate::state::entity::{Entity, EntityId, EntityMention};
use crate::state::reference::{OpenReference, RefId};
use crate::state::scope::{SalienceFrame, Scope, ScopeId};
use crate::task::{Span, TaskId};

/// A single speaker turn produced by the upstream segmenter. Opaque to
/// the core: turns are never re-segmented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub speaker: String,
    pub text: String,
    pub span: Span,
    pub turn_index: usize,
}

/// An argument frame under construction in working memory.
///
/// Emitted artifacts are immutable, so frames accumulate here (claims
/// link in, dialectic relations attach) and become `ArgumentFrame`
/// artifacts only when finalized.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub frame_id: ArtifactId,
    pub summary: String,
    pub role: FrameRole,
    pub speaker: String,
    pub span: Span,
    pub child_claim_ids: Vec<ArtifactId>,
    pub parent_frame_id: Option<ArtifactId>,
    pub confidence: f64,
}

/// A dialectic relation detected for a turn, waiting to be applied when
/// that turn's frame is finalized.
#[derive(Debug, Clone)]
pub struct PendingRelation {
    pub role: FrameRole,
    pub parent_frame_id: Option<ArtifactId>,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// The blackboard.
#[derive(Debug, Default)]
pub struct DiscourseState {
    // --- Input (immutable after init) ---
    pub transcript_id: String,
    pub transcript_text: String,
    pub speaker_turns: Vec<SpeakerTurn>,

    // --- Entity tracking (mutable working memory) ---
    /// Keyed by dedup key; BTreeMap so enumeration order is deterministic.
    entities: BTreeMap<EntityId, Entity>,
    entity_mentions: Vec<EntityMention>,

    // --- Scope management ---
    scope_stack: Vec<Scope>,
    salience_stack: Vec<SalienceFrame>,
    pub current_scope_id: Option<ScopeId>,
    pub current_speaker: Option<String>,

    // --- Reference resolution ---
    open_references: Vec<OpenReference>,
    /// Resolved reference id -> artifact id of its TentativeResolution.
    /// The artifact store holds the single record.
    resolved_references: BTreeMap<RefId, ArtifactId>,

    // --- Artifact emission (append-only, idempotent by id) ---
    artifacts: Vec<Artifact>,
    artifact_index: HashMap<ArtifactId, usize>,

    // --- Frame assembly working memory ---
    pending_frames: BTreeMap<usize, PendingFrame>,
    pending_relations: BTreeMap<usize, PendingRelation>,
    /// Turn index -> frame artifact id, recorded at finalization so later
    /// turns can attach to earlier frames.
    turn_frames: BTreeMap<usize, ArtifactId>,
    current_frame_turn: Option<usize>,

    // --- Execution counters ---
    pub tasks_executed: u32,
    pub model_calls: u32,
    pub model_tokens: u64,

    // --- Method path tracking ---
    method_paths: HashMap<TaskId, Vec<String>>,
}

impl DiscourseState {
    /// Create state from a preprocessed transcript.
    ///
    /// Every instance gets freshly constructed containers; nothing is
    /// shared between states.
    pub fn from_transcript(
        transcript_id: impl Into<String>,
        transcript_text: impl Into<String>,
        speaker_turns: Vec<SpeakerTurn>,
    ) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            transcript_text: transcript_text.into(),
            speaker_turns,
            ..Default::default()
        }
    }

    // =======================================================================
    // Artifact API
    // =======================================================================

    /// Idempotent insert by id; returns the (possibly pre-existing) id.
    pub fn emit_artifact(&mut self, artifact: Artifact) -> ArtifactId {
        if self.artifact_index.contains_key(&artifact.id) {
            return artifact.id;
        }
        let id = artifact.id.clone();
        debug!(artifact_id = %id, artifact_type = artifact.artifact_type(), "emit artifact");
        self.artifact_index.insert(id.clone(), self.artifacts.len());
        self.artifacts.push(artifact);
        id
    }

    pub fn get_artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifact_index.get(id).map(|&i| &self.artifacts[i])
    }

    /// All emitted artifacts in insertion order.
    pub fn collect_artifacts(&self) -> Vec<Artifact> {
        self.artifacts.clone()
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Ordered claim view over the artifact store.
    pub fn claims(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.as_claim().is_some())
    }

    /// Ordered frame view over the artifact store.
    pub fn frames(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.as_frame().is_some())
    }

    // =======================================================================
    // Entity API
    // =======================================================================

    /// Register or merge an entity; returns its canonical id.
    ///
    /// Entities are keyed by the dedup key of their canonical name: a
    /// re-registration merges mention spans and aliases into the existing
    /// entity. Entities are never duplicated, only grown.
    pub fn register_entity(&mut self, mut entity: Entity) -> EntityId {
        let key = entity_dedup_key(&entity.canonical);
        self.entity_mentions.push(EntityMention {
            entity_id: key.clone(),
            span: entity.first_mention_span,
            surface_form: entity.canonical.clone(),
            scope_id: self.current_scope_id.clone(),
        });

        if let Some(existing) = self.entities.get_mut(&key) {
            existing.mention_spans.extend(entity.mention_spans.drain(..));
            existing.aliases.append(&mut entity.aliases);
            return existing.id.clone();
        }

        debug!(entity_id = %key, canonical = %entity.canonical, "register entity");
        entity.id = key.clone();
        self.entities.insert(key.clone(), entity);
        key
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Find an entity by canonical name or alias.
    pub fn find_entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.values().find(|e| e.matches(name))
    }

    /// All entities in dedup-key order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_mentions(&self) -> &[EntityMention] {
        &self.entity_mentions
    }

    // =======================================================================
    // Scope API
    // =======================================================================

    pub fn push_scope(&mut self, scope: Scope) {
        self.current_scope_id = Some(scope.id.clone());
        self.current_speaker = Some(scope.speaker.clone());
        self.salience_stack.push(SalienceFrame::new(scope.id.clone(), scope.speaker.clone()));
        self.scope_stack.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        let popped = self.scope_stack.pop()?;
        self.salience_stack.pop();
        self.current_scope_id = self.scope_stack.last().map(|s| s.id.clone());
        self.current_speaker = self.scope_stack.last().map(|s| s.speaker.clone());
        Some(popped)
    }

    /// Current scope is always the top of the stack, or none when empty.
    pub fn current_scope(&self) -> Option<&Scope> {
        self.scope_stack.last()
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_stack.len()
    }

    // =======================================================================
    // Salience API
    // =======================================================================

    /// Boost an entity in the current salience frame.
    pub fn boost_salience(&mut self, entity_id: &EntityId) {
        if let Some(frame) = self.salience_stack.last_mut() {
            frame.boost(entity_id);
        }
    }

    /// Most salient entity ids, innermost scopes first, optionally
    /// filtered by speaker.
    pub fn salient_entities(&self, speaker: Option<&str>, limit: usize) -> Vec<EntityId> {
        let mut result: Vec<EntityId> = Vec::new();
        for frame in self.salience_stack.iter().rev() {
            if speaker.is_some_and(|s| s != frame.speaker) {
                continue;
            }
            for entity_id in &frame.entities {
                if !result.contains(entity_id) {
                    result.push(entity_id.clone());
                }
                if result.len() >= limit {
                    return result;
                }
            }
        }
        result
    }

    // =======================================================================
    // Reference API
    // =======================================================================

    pub fn register_open_reference(&mut self, reference: OpenReference) {
        self.open_references.push(reference);
    }

    /// Record a resolution and atomically drop the open entry: a
    /// reference is never simultaneously open and resolved.
    pub fn resolve_reference(&mut self, ref_id: &str, resolution_artifact: ArtifactId) {
        self.resolved_references.insert(ref_id.to_string(), resolution_artifact);
        self.open_references.retain(|r| r.id != ref_id);
    }

    pub fn open_references(&self) -> &[OpenReference] {
        &self.open_references
    }

    pub fn resolved_references(&self) -> &BTreeMap<RefId, ArtifactId> {
        &self.resolved_references
    }

    // =======================================================================
    // Frame assembly API
    // =======================================================================

    /// Begin assembling a frame for a turn and make it current.
    pub fn begin_frame(&mut self, turn_index: usize, frame: PendingFrame) {
        self.pending_frames.insert(turn_index, frame);
        self.current_frame_turn = Some(turn_index);
    }

    /// Frame id claims should link to right now, if a frame is open.
    pub fn current_frame_id(&self) -> Option<ArtifactId> {
        self.current_frame_turn
            .and_then(|t| self.pending_frames.get(&t))
            .map(|f| f.frame_id.clone())
    }

    /// Attach a claim to the frame currently under assembly.
    pub fn link_claim_to_current_frame(&mut self, claim_id: &ArtifactId) {
        if let Some(frame) = self.current_frame_turn.and_then(|t| self.pending_frames.get_mut(&t)) {
            if !frame.child_claim_ids.contains(claim_id) {
                frame.child_claim_ids.push(claim_id.clone());
            }
        }
    }

    /// Remove and return a turn's frame under assembly (for emission).
    pub fn take_pending_frame(&mut self, turn_index: usize) -> Option<PendingFrame> {
        if self.current_frame_turn == Some(turn_index) {
            self.current_frame_turn = None;
        }
        self.pending_frames.remove(&turn_index)
    }

    /// Record the emitted frame artifact for a turn so later turns can
    /// attach dialectic relations to it.
    pub fn record_turn_frame(&mut self, turn_index: usize, frame_id: ArtifactId) {
        self.turn_frames.insert(turn_index, frame_id);
    }

    pub fn turn_frame(&self, turn_index: usize) -> Option<&ArtifactId> {
        self.turn_frames.get(&turn_index)
    }

    pub fn set_pending_relation(&mut self, turn_index: usize, relation: PendingRelation) {
        self.pending_relations.insert(turn_index, relation);
    }

    pub fn take_pending_relation(&mut self, turn_index: usize) -> Option<PendingRelation> {
        self.pending_relations.remove(&turn_index)
    }

    // =======================================================================
    // Method path tracking
    // =======================================================================

    /// Record a method selection, extending the parent task's path.
    pub fn record_method(&mut self, task_id: &str, method_name: &str, parent_task_id: Option<&str>) {
        let mut path = parent_task_id
            .and_then(|p| self.method_paths.get(p).cloned())
            .unwrap_or_default();
        path.push(method_name.to_string());
        self.method_paths.insert(task_id.to_string(), path);
    }

    /// Root-to-leaf method names recorded for a task.
    pub fn method_path(&self, task_id: &str) -> Vec<String> {
        self.method_paths.get(task_id).cloned().unwrap_or_default()
    }
}
