//! Coreference methods: speaker registration, reference detection and
//! scored resolution with first-class uncertainty.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{scaled_cost, task_types, turn_params};
use crate::artifact::{
    Artifact, ArtifactPayload, Provenance, ReferenceKind, ScoredCandidate, TentativeResolution,
    DEFAULT_COMMIT_THRESHOLD,
};
use crate::error::MethodError;
use crate::registry::Method;
use crate::result::OperatorResult;
use crate::state::{DiscourseState, Entity, EntityId, EntityKind, OpenReference};
use crate::task::{Span, Task};

/// Third-person pronouns that need resolution; first-person forms refer
/// to the speaker and are not tracked.
const PRONOUNS: [&str; 12] = [
    "he", "him", "his", "she", "her", "hers", "they", "them", "their", "theirs", "it", "its",
];

const DEMONSTRATIVES: [&str; 4] = ["this", "that", "these", "those"];

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(he|him|his|she|her|hers|they|them|their|theirs|it|its|this|that|these|those)\b",
    )
    .expect("reference pattern")
});

fn reference_kind(word: &str) -> Option<ReferenceKind> {
    let lower = word.to_lowercase();
    if PRONOUNS.contains(&lower.as_str()) {
        Some(ReferenceKind::Pronoun)
    } else if DEMONSTRATIVES.contains(&lower.as_str()) {
        Some(ReferenceKind::Demonstrative)
    } else {
        None
    }
}

fn parse_reference_kind(tag: &str) -> Option<ReferenceKind> {
    match tag {
        "PRONOUN" => Some(ReferenceKind::Pronoun),
        "DEMONSTRATIVE" => Some(ReferenceKind::Demonstrative),
        "DEFINITE_NP" => Some(ReferenceKind::DefiniteNp),
        "ELLIPSIS" => Some(ReferenceKind::Ellipsis),
        _ => None,
    }
}

fn kind_tag(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Pronoun => "PRONOUN",
        ReferenceKind::Demonstrative => "DEMONSTRATIVE",
        ReferenceKind::DefiniteNp => "DEFINITE_NP",
        ReferenceKind::Ellipsis => "ELLIPSIS",
    }
}

/// Primitive: register a speaker as a PERSON entity and boost its
/// salience.
pub struct RegisterSpeakerEntity;

impl Method for RegisterSpeakerEntity {
    fn name(&self) -> &'static str {
        "RegisterSpeakerEntity"
    }

    fn task_type(&self) -> &'static str {
        task_types::REGISTER_SPEAKER_ENTITY
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.param_str("speaker").is_some_and(|s| s != "UNKNOWN")
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(1.0, task)
    }

    fn decompose(&self, _state: &DiscourseState, _task: &Task) -> Vec<Task> {
        Vec::new()
    }

    fn execute(
        &self,
        state: &mut DiscourseState,
        task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        let speaker = task
            .param_str("speaker")
            .ok_or_else(|| MethodError::MissingParam("speaker".to_string()))?
            .to_string();

        if let Some(existing) = state.find_entity_by_name(&speaker) {
            let entity_id = existing.id.clone();
            state.boost_salience(&entity_id);
            return Ok(OperatorResult::success()
                .with_mutation(format!("boosted salience for existing entity {}", speaker)));
        }

        let mut entity =
            Entity::new(&speaker, EntityKind::Person, task.span).with_speaker(&speaker);
        entity.add_alias(&speaker);
        let entity_id = state.register_entity(entity);
        state.boost_salience(&entity_id);

        Ok(OperatorResult::success()
            .with_mutation(format!("registered speaker {} as entity {}", speaker, entity_id)))
    }
}

/// Compound: find pronouns/demonstratives in a turn and create one
/// resolution task per occurrence.
pub struct DetectReferences;

impl Method for DetectReferences {
    fn name(&self) -> &'static str {
        "DetectReferences"
    }

    fn task_type(&self) -> &'static str {
        task_types::DETECT_REFERENCES
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.param_str("text").is_some_and(|t| !t.is_empty())
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(3.0, task)
    }

    fn decompose(&self, _state: &DiscourseState, task: &Task) -> Vec<Task> {
        let text = task.param_str("text").unwrap_or_default();
        let speaker = task.param_str("speaker").unwrap_or("UNKNOWN");
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;

        REFERENCE_PATTERN
            .find_iter(text)
            .filter_map(|m| {
                let kind = reference_kind(m.as_str())?;
                let start = task.span.start + m.start();
                let mut params = turn_params(turn_index, speaker);
                params.insert("surface_form".to_string(), serde_json::json!(m.as_str()));
                params.insert("ref_type".to_string(), serde_json::json!(kind_tag(kind)));
                Some(Task::new(
                    task_types::RESOLVE_REFERENCE,
                    params,
                    Span::new(start, start + m.len()),
                ))
            })
            .collect()
    }

    /// Reached when the turn has no trackable references: an empty
    /// decomposition routes here, and finding nothing is not a failure.
    fn execute(
        &self,
        _state: &mut DiscourseState,
        _task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        Ok(OperatorResult::success().with_mutation("no references detected"))
    }
}

/// Primitive: resolve one reference against the entity table with scored
/// candidates and an explicit commit state machine.
pub struct ResolveReference {
    pub commit_threshold: f64,
}

impl Default for ResolveReference {
    fn default() -> Self {
        Self {
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
        }
    }
}

impl Method for ResolveReference {
    fn name(&self) -> &'static str {
        "ResolveReference"
    }

    fn task_type(&self) -> &'static str {
        task_types::RESOLVE_REFERENCE
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.params.contains_key("surface_form") && task.params.contains_key("ref_type")
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(5.0, task)
    }

    fn decompose(&self, _state: &DiscourseState, _task: &Task) -> Vec<Task> {
        Vec::new()
    }

    fn execute(
        &self,
        state: &mut DiscourseState,
        task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        let surface_form = task
            .param_str("surface_form")
            .ok_or_else(|| MethodError::MissingParam("surface_form".to_string()))?
            .to_string();
        let ref_type = task
            .param_str("ref_type")
            .and_then(parse_reference_kind)
            .ok_or_else(|| MethodError::MissingParam("ref_type".to_string()))?;
        let current_speaker = task
            .param_str("speaker")
            .map(str::to_string)
            .or_else(|| state.current_speaker.clone());

        let ref_id = format!("ref_{}_{}", task.span.start, task.span.end);
        let mut open_ref = OpenReference::new(&ref_id, ref_type, &surface_form, task.span);
        open_ref.scope_id = state.current_scope_id.clone();
        state.register_open_reference(open_ref);

        let candidates = find_candidates(state, ref_type);
        let scored = score_candidates(state, ref_type, current_speaker.as_deref(), &candidates, task.span);

        let reason = match scored.first() {
            None if candidates.is_empty() => "no candidates found in scope".to_string(),
            None => "all candidates filtered (self-reference)".to_string(),
            Some(best) => best.reasons.join("; "),
        };

        let mut resolution = TentativeResolution::from_candidates(
            &surface_form,
            task.span,
            ref_type,
            scored.into_iter().take(5).collect(),
            reason,
        );
        if let Some(best) = resolution.candidates.first() {
            resolution.scoring_features.insert("top_score".to_string(), best.score);
        }
        resolution.method_path = state.method_path(&task.id);
        resolution.evaluate(self.commit_threshold);

        let resolved = resolution.winner.is_some();
        let mutation = match (&resolution.winner, &resolution.confidence) {
            (Some(winner), confidence) => {
                format!("resolved {:?} -> {} ({:.2})", surface_form, winner, confidence)
            }
            (None, _) => format!("unresolved reference: {:?}", surface_form),
        };

        let artifact_id = state.emit_artifact(Artifact::new(
            format!("resolution_{}", ref_id),
            Provenance::new(task.id.clone(), self.name()),
            ArtifactPayload::Resolution(resolution),
        ));
        if resolved {
            state.resolve_reference(&ref_id, artifact_id.clone());
        }

        Ok(OperatorResult::success()
            .with_artifact(artifact_id)
            .with_mutation(mutation))
    }
}

/// Candidate entities: salient ones first, then (for pronouns) every
/// known person. Enumeration order is deterministic.
fn find_candidates(state: &DiscourseState, ref_type: ReferenceKind) -> Vec<EntityId> {
    let mut candidates = state.salient_entities(None, 10);

    if ref_type == ReferenceKind::Pronoun {
        for entity in state.entities() {
            if entity.kind == EntityKind::Person && !candidates.contains(&entity.id) {
                candidates.push(entity.id.clone());
            }
        }
    }

    candidates
}

/// Score candidates for a reference. Returns highest score first; equal
/// scores keep candidate enumeration order.
fn score_candidates(
    state: &DiscourseState,
    ref_type: ReferenceKind,
    current_speaker: Option<&str>,
    candidates: &[EntityId],
    ref_span: Span,
) -> Vec<ScoredCandidate> {
    let salient = state.salient_entities(None, 5);
    let transcript_end = state
        .speaker_turns
        .last()
        .map(|t| t.span.end.max(1))
        .unwrap_or(1);

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter_map(|entity_id| {
            let entity = state.get_entity(entity_id)?;

            // A reference cannot resolve to the entity that contains it.
            if entity.first_mention_span.contains(ref_span) {
                return None;
            }

            let mut score = 0.0;
            let mut reasons = Vec::new();

            if let Some(rank) = salient.iter().position(|id| id == entity_id) {
                score += 0.3 * (1.0 - rank as f64 / 5.0);
                reasons.push(format!("salient (rank {})", rank + 1));
            }

            if ref_type == ReferenceKind::Pronoun && entity.kind == EntityKind::Person {
                if current_speaker.is_some_and(|s| s == entity.canonical) {
                    score -= 0.2;
                    reasons.push("same speaker (unlikely)".to_string());
                } else {
                    score += 0.6;
                    reasons.push("other speaker (pronoun target)".to_string());
                }
            }

            if ref_type == ReferenceKind::Demonstrative
                && matches!(entity.kind, EntityKind::Claim | EntityKind::Concept)
            {
                score += 0.4;
                reasons.push("claim/concept (demonstrative target)".to_string());
            }

            let recency = entity.first_mention_span.start as f64 / transcript_end as f64;
            score += 0.2 * recency;
            reasons.push(format!("recency ({:.2})", recency));

            score += 0.1;
            reasons.push("candidate".to_string());

            Some(ScoredCandidate {
                entity_id: entity_id.clone(),
                score: score.clamp(0.0, 1.0),
                reasons,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ResolutionStatus;
    use crate::state::SpeakerTurn;
    use std::collections::BTreeMap;

    fn state_with_speakers() -> DiscourseState {
        let turns = vec![
            SpeakerTurn {
                speaker: "Alice".into(),
                text: "The study found 40% improvement.".into(),
                span: Span::new(0, 32),
                turn_index: 0,
            },
            SpeakerTurn {
                speaker: "Bob".into(),
                text: "But he ignores the data.".into(),
                span: Span::new(33, 57),
                turn_index: 1,
            },
        ];
        DiscourseState::from_transcript("t", "", turns)
    }

    #[test]
    fn test_detect_references_creates_resolution_tasks() {
        let state = state_with_speakers();
        let mut params = turn_params(1, "Bob");
        params.insert("text".to_string(), serde_json::json!("But he ignores the data."));
        let task = Task::new(task_types::DETECT_REFERENCES, params, Span::new(33, 57));

        let subtasks = DetectReferences.decompose(&state, &task);
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].param_str("surface_form"), Some("he"));
        assert_eq!(subtasks[0].param_str("ref_type"), Some("PRONOUN"));
        // "he" occurs at offset 4 of the turn text.
        assert_eq!(subtasks[0].span, Span::new(37, 39));
    }

    #[test]
    fn test_resolve_pronoun_prefers_other_speaker() {
        let mut state = state_with_speakers();
        let alice = state.register_entity(
            Entity::new("Alice", EntityKind::Person, Span::new(0, 5)).with_speaker("Alice"),
        );
        state.register_entity(
            Entity::new("Bob", EntityKind::Person, Span::new(33, 36)).with_speaker("Bob"),
        );

        let mut params = turn_params(1, "Bob");
        params.insert("surface_form".to_string(), serde_json::json!("he"));
        params.insert("ref_type".to_string(), serde_json::json!("PRONOUN"));
        let task = Task::new(task_types::RESOLVE_REFERENCE, params, Span::new(37, 39));

        let result = ResolveReference::default().execute(&mut state, &task).unwrap();
        assert_eq!(result.artifacts_emitted.len(), 1);

        let artifact = state.get_artifact(&result.artifacts_emitted[0]).unwrap();
        let resolution = artifact.as_resolution().unwrap();
        assert_eq!(resolution.winner.as_deref(), Some(alice.as_str()));
        assert!(state.open_references().is_empty());
        assert!(state.resolved_references().contains_key("ref_37_39"));
    }

    #[test]
    fn test_resolve_without_candidates_stays_open() {
        let mut state = state_with_speakers();
        let mut params = turn_params(0, "Alice");
        params.insert("surface_form".to_string(), serde_json::json!("it"));
        params.insert("ref_type".to_string(), serde_json::json!("PRONOUN"));
        let task = Task::new(task_types::RESOLVE_REFERENCE, params, Span::new(10, 12));

        let result = ResolveReference::default().execute(&mut state, &task).unwrap();
        let artifact = state.get_artifact(&result.artifacts_emitted[0]).unwrap();
        assert_eq!(
            artifact.as_resolution().unwrap().status,
            ResolutionStatus::Unresolved
        );
        assert_eq!(state.open_references().len(), 1);
        assert!(state.resolved_references().is_empty());
    }

    #[test]
    fn test_register_speaker_entity_merges_on_repeat() {
        let mut state = state_with_speakers();
        let task = Task::new(
            task_types::REGISTER_SPEAKER_ENTITY,
            turn_params(0, "Alice"),
            Span::new(0, 5),
        );
        RegisterSpeakerEntity.execute(&mut state, &task).unwrap();
        RegisterSpeakerEntity.execute(&mut state, &task).unwrap();
        assert_eq!(state.entities().count(), 1);
    }

    #[test]
    fn test_reference_kind_classification() {
        assert_eq!(reference_kind("He"), Some(ReferenceKind::Pronoun));
        assert_eq!(reference_kind("those"), Some(ReferenceKind::Demonstrative));
        assert_eq!(reference_kind("banana"), None);
        assert!(parse_reference_kind("DEFINITE_NP").is_some());
        assert!(parse_reference_kind("bogus").is_none());
    }

    #[test]
    fn test_resolve_reference_requires_params() {
        let state = DiscourseState::default();
        let task = Task::new(task_types::RESOLVE_REFERENCE, BTreeMap::new(), Span::new(0, 1));
        assert!(!ResolveReference::default().preconditions(&state, &task));
    }
}
