//! Dialectic structure: frame assembly and support/rebuttal detection.
//!
//! Frames are assembled in working memory while a turn is processed and
//! emitted as immutable artifacts at FINALIZE_FRAME, once claims and the
//! turn's dialectic relation have attached.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{scaled_cost, task_types};
use crate::artifact::{Artifact, ArtifactPayload, ArgumentFrame, FrameRole, Provenance};
use crate::error::MethodError;
use crate::registry::Method;
use crate::result::OperatorResult;
use crate::state::{DiscourseState, PendingFrame, PendingRelation};
use crate::task::Task;

static REBUTTAL_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*but\b|^\s*however\b|\bhowever,|\byet\b|\balthough\b|\bdisagrees?\b|\bwrong\b|\bincorrect\b|\bthat's not\b|\bthat argument\b|\bignores?\b",
    )
    .expect("rebuttal marker pattern")
});

static SUPPORT_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bbecause\b|\btherefore\b|\bthus\b|\bproves?\s+that\b|\bshows?\s+that\b|\bevidence\s+(that|for)\b|\bdemonstrates?\b|\bsince\b",
    )
    .expect("support marker pattern")
});

/// Primitive: open the turn's frame in working memory.
pub struct BuildArgumentFrame;

impl Method for BuildArgumentFrame {
    fn name(&self) -> &'static str {
        "BuildArgumentFrame"
    }

    fn task_type(&self) -> &'static str {
        task_types::BUILD_ARGUMENT_FRAME
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.params.contains_key("speaker")
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(3.0, task)
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
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;
        let frame_id = format!("frame_turn_{}", turn_index);

        state.begin_frame(
            turn_index,
            PendingFrame {
                frame_id: frame_id.clone(),
                summary: format!("{}'s argument", speaker),
                role: FrameRole::Claim,
                speaker,
                span: task.span,
                child_claim_ids: Vec::new(),
                parent_frame_id: None,
                confidence: 0.7,
            },
        );

        Ok(OperatorResult::success()
            .with_mutation(format!("opened frame {} for turn {}", frame_id, turn_index)))
    }
}

/// Primitive: detect whether this turn rebuts or supports the previous
/// turn and stash the relation for frame finalization.
pub struct DetectDialecticRelation;

impl Method for DetectDialecticRelation {
    fn name(&self) -> &'static str {
        "DetectDialecticRelation"
    }

    fn task_type(&self) -> &'static str {
        task_types::DETECT_DIALECTIC_RELATION
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.param_str("text").is_some_and(|t| !t.is_empty())
            && task.param_u64("turn_index").is_some_and(|i| i > 0)
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(2.0, task)
    }

    fn decompose(&self, _state: &DiscourseState, _task: &Task) -> Vec<Task> {
        Vec::new()
    }

    fn execute(
        &self,
        state: &mut DiscourseState,
        task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        let text = task
            .param_str("text")
            .ok_or_else(|| MethodError::MissingParam("text".to_string()))?;
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;

        let detected = if let Some(m) = REBUTTAL_MARKERS.find(text) {
            Some((FrameRole::Rebuttal, 0.8, format!("rebuttal marker: {:?}", m.as_str())))
        } else {
            SUPPORT_MARKERS
                .find(text)
                .map(|m| (FrameRole::Support, 0.7, format!("support marker: {:?}", m.as_str())))
        };

        let Some((role, confidence, reason)) = detected else {
            return Ok(OperatorResult::success().with_mutation("no dialectic relation detected"));
        };

        let parent_frame_id = turn_index
            .checked_sub(1)
            .and_then(|prev| state.turn_frame(prev))
            .cloned();
        state.set_pending_relation(
            turn_index,
            PendingRelation {
                role,
                parent_frame_id,
                confidence,
                reasons: vec![reason.clone()],
            },
        );

        Ok(OperatorResult::success().with_mutation(format!(
            "detected {:?} relation (conf={:.2}): {}",
            role, confidence, reason
        )))
    }
}

/// Primitive: apply the pending relation and emit the turn's frame as an
/// immutable artifact.
pub struct FinalizeFrame;

impl Method for FinalizeFrame {
    fn name(&self) -> &'static str {
        "FinalizeFrame"
    }

    fn task_type(&self) -> &'static str {
        task_types::FINALIZE_FRAME
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.params.contains_key("turn_index")
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
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;

        let Some(pending) = state.take_pending_frame(turn_index) else {
            return Ok(OperatorResult::success().with_mutation("no frame to finalize"));
        };

        let mut frame = ArgumentFrame {
            summary: pending.summary,
            role: pending.role,
            speaker: Some(pending.speaker),
            spans: vec![pending.span],
            child_claim_ids: pending.child_claim_ids,
            child_frame_ids: Vec::new(),
            parent_frame_id: pending.parent_frame_id,
            confidence: pending.confidence,
        };
        if let Some(relation) = state.take_pending_relation(turn_index) {
            frame.role = relation.role;
            frame.parent_frame_id = relation.parent_frame_id;
            frame.confidence = relation.confidence;
        }
        let role = frame.role;

        let frame_id = state.emit_artifact(Artifact::new(
            pending.frame_id,
            Provenance::new(task.id.clone(), self.name()),
            ArtifactPayload::Frame(frame),
        ));
        state.record_turn_frame(turn_index, frame_id.clone());

        Ok(OperatorResult::success()
            .with_artifact(frame_id.clone())
            .with_mutation(format!("finalized frame {} as {:?}", frame_id, role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Span;
    use std::collections::BTreeMap;

    use super::super::turn_params;

    fn frame_task(task_type: &str, turn_index: usize, speaker: &str, span: Span) -> Task {
        Task::new(task_type, turn_params(turn_index, speaker), span)
    }

    #[test]
    fn test_frame_lifecycle_build_then_finalize() {
        let mut state = DiscourseState::default();
        let build = frame_task(task_types::BUILD_ARGUMENT_FRAME, 0, "Alice", Span::new(0, 20));
        BuildArgumentFrame.execute(&mut state, &build).unwrap();
        state.link_claim_to_current_frame(&"claim_a".to_string());

        let finalize = frame_task(task_types::FINALIZE_FRAME, 0, "Alice", Span::new(0, 20));
        let result = FinalizeFrame.execute(&mut state, &finalize).unwrap();
        assert_eq!(result.artifacts_emitted, vec!["frame_turn_0".to_string()]);

        let frame = state.get_artifact("frame_turn_0").unwrap().as_frame().unwrap().clone();
        assert_eq!(frame.role, FrameRole::Claim);
        assert_eq!(frame.child_claim_ids, vec!["claim_a".to_string()]);
        assert_eq!(state.turn_frame(0).map(String::as_str), Some("frame_turn_0"));
    }

    #[test]
    fn test_rebuttal_relation_links_previous_frame() {
        let mut state = DiscourseState::default();
        state.record_turn_frame(0, "frame_turn_0".to_string());

        let mut params = turn_params(1, "Bob");
        params.insert(
            "text".to_string(),
            serde_json::json!("But that argument ignores the evidence."),
        );
        let detect = Task::new(task_types::DETECT_DIALECTIC_RELATION, params, Span::new(21, 60));
        DetectDialecticRelation.execute(&mut state, &detect).unwrap();

        let build = frame_task(task_types::BUILD_ARGUMENT_FRAME, 1, "Bob", Span::new(21, 60));
        BuildArgumentFrame.execute(&mut state, &build).unwrap();
        let finalize = frame_task(task_types::FINALIZE_FRAME, 1, "Bob", Span::new(21, 60));
        FinalizeFrame.execute(&mut state, &finalize).unwrap();

        let frame = state.get_artifact("frame_turn_1").unwrap().as_frame().unwrap().clone();
        assert_eq!(frame.role, FrameRole::Rebuttal);
        assert_eq!(frame.parent_frame_id.as_deref(), Some("frame_turn_0"));
        assert!((frame.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_support_marker_detected_when_no_rebuttal() {
        let mut state = DiscourseState::default();
        let mut params = turn_params(1, "Bob");
        params.insert(
            "text".to_string(),
            serde_json::json!("That follows because the numbers back it up."),
        );
        let detect = Task::new(task_types::DETECT_DIALECTIC_RELATION, params, Span::new(0, 44));
        let result = DetectDialecticRelation.execute(&mut state, &detect).unwrap();
        assert!(result.state_mutations[0].contains("Support"));
    }

    #[test]
    fn test_finalize_without_frame_is_a_noop() {
        let mut state = DiscourseState::default();
        let finalize = frame_task(task_types::FINALIZE_FRAME, 3, "Ann", Span::new(0, 5));
        let result = FinalizeFrame.execute(&mut state, &finalize).unwrap();
        assert!(result.artifacts_emitted.is_empty());
        assert!(state.get_artifact("frame_turn_3").is_none());
    }

    #[test]
    fn test_detect_relation_needs_previous_turn() {
        let state = DiscourseState::default();
        let mut params = BTreeMap::new();
        params.insert("text".to_string(), serde_json::json!("But no."));
        params.insert("turn_index".to_string(), serde_json::json!(0));
        let task = Task::new(task_types::DETECT_DIALECTIC_RELATION, params, Span::new(0, 7));
        assert!(!DetectDialecticRelation.preconditions(&state, &task));
    }
}
