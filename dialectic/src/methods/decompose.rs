//! Decomposition methods for transcripts and turns, plus scope discipline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::{scaled_cost, task_types, trimmed_with_offset, turn_params};
use crate::error::MethodError;
use crate::registry::Method;
use crate::result::OperatorResult;
use crate::state::{DiscourseState, Scope, ScopeKind};
use crate::task::{Span, Task};

/// Discourse markers that indicate argument boundaries within a turn.
static BOUNDARY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(but|however|on the other hand|pushes back|disagrees|counters|although|nevertheless|yet)\b",
    )
    .expect("boundary marker pattern")
});

/// Root method: one PROCESS_TURN subtask per speaker turn, in turn order.
pub struct DecomposeTranscript;

impl Method for DecomposeTranscript {
    fn name(&self) -> &'static str {
        "DecomposeTranscript"
    }

    fn task_type(&self) -> &'static str {
        task_types::DECOMPOSE_TRANSCRIPT
    }

    fn preconditions(&self, state: &DiscourseState, _task: &Task) -> bool {
        !state.speaker_turns.is_empty()
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(1.0, task)
    }

    fn decompose(&self, state: &DiscourseState, _task: &Task) -> Vec<Task> {
        state
            .speaker_turns
            .iter()
            .map(|turn| {
                Task::new(
                    task_types::PROCESS_TURN,
                    turn_params(turn.turn_index, &turn.speaker),
                    turn.span,
                )
            })
            .collect()
    }
}

/// Process a single speaker turn: register the speaker, open a scope,
/// relate the turn to the previous one, build its frame, extract claims
/// per discourse-marker segment, resolve references, finalize, close.
pub struct ProcessTurn;

impl Method for ProcessTurn {
    fn name(&self) -> &'static str {
        "ProcessTurn"
    }

    fn task_type(&self) -> &'static str {
        task_types::PROCESS_TURN
    }

    fn preconditions(&self, state: &DiscourseState, task: &Task) -> bool {
        task.param_u64("turn_index")
            .is_some_and(|i| (i as usize) < state.speaker_turns.len())
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(5.0, task)
    }

    fn decompose(&self, state: &DiscourseState, task: &Task) -> Vec<Task> {
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;
        let Some(turn) = state.speaker_turns.get(turn_index) else {
            return Vec::new();
        };

        let mut subtasks = Vec::new();

        subtasks.push(Task::new(
            task_types::REGISTER_SPEAKER_ENTITY,
            turn_params(turn_index, &turn.speaker),
            turn.span,
        ));

        let mut scope_params = turn_params(turn_index, &turn.speaker);
        scope_params.insert("scope_type".to_string(), json!("TURN"));
        scope_params.insert("scope_id".to_string(), json!(format!("turn_{}", turn_index)));
        subtasks.push(Task::new(task_types::PUSH_SCOPE, scope_params, turn.span));

        if turn_index > 0 {
            let mut params = turn_params(turn_index, &turn.speaker);
            params.insert("text".to_string(), json!(turn.text));
            subtasks.push(Task::new(
                task_types::DETECT_DIALECTIC_RELATION,
                params,
                turn.span,
            ));
        }

        subtasks.push(Task::new(
            task_types::BUILD_ARGUMENT_FRAME,
            turn_params(turn_index, &turn.speaker),
            turn.span,
        ));

        for (seg_span, seg_text) in segment_on_markers(&turn.text, turn.span) {
            let mut params = turn_params(turn_index, &turn.speaker);
            params.insert("text".to_string(), json!(seg_text));
            subtasks.push(Task::new(
                task_types::EXTRACT_CLAIMS_FROM_SEGMENT,
                params,
                seg_span,
            ));
        }

        let mut ref_params = turn_params(turn_index, &turn.speaker);
        ref_params.insert("text".to_string(), json!(turn.text));
        subtasks.push(Task::new(task_types::DETECT_REFERENCES, ref_params, turn.span));

        subtasks.push(Task::new(
            task_types::FINALIZE_FRAME,
            turn_params(turn_index, &turn.speaker),
            turn.span,
        ));

        subtasks.push(Task::new(
            task_types::POP_SCOPE,
            turn_params(turn_index, &turn.speaker),
            turn.span,
        ));

        subtasks
    }
}

/// Segment a turn on discourse markers; each marker starts a new segment.
/// Falls back to the whole turn when no marker is present.
fn segment_on_markers(text: &str, span: Span) -> Vec<(Span, String)> {
    let mut segments = Vec::new();
    let mut last = 0;

    for m in BOUNDARY_MARKERS.find_iter(text) {
        if m.start() > last {
            if let Some((offset, seg)) = trimmed_with_offset(span.start + last, &text[last..m.start()]) {
                segments.push((Span::new(offset, offset + seg.len()), seg.to_string()));
            }
        }
        last = m.start();
    }

    if last < text.len() {
        if let Some((offset, seg)) = trimmed_with_offset(span.start + last, &text[last..]) {
            segments.push((Span::new(offset, offset + seg.len()), seg.to_string()));
        }
    }

    if segments.is_empty() {
        if let Some((offset, seg)) = trimmed_with_offset(span.start, text) {
            segments.push((Span::new(offset, offset + seg.len()), seg.to_string()));
        }
    }

    segments
}

/// Primitive: push a new scope onto the stack.
pub struct PushScope;

impl Method for PushScope {
    fn name(&self) -> &'static str {
        "PushScope"
    }

    fn task_type(&self) -> &'static str {
        task_types::PUSH_SCOPE
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.params.contains_key("scope_type") && task.params.contains_key("speaker")
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
        let kind = task
            .param_str("scope_type")
            .and_then(ScopeKind::parse)
            .unwrap_or(ScopeKind::Turn);
        let speaker = task
            .param_str("speaker")
            .ok_or_else(|| MethodError::MissingParam("speaker".to_string()))?
            .to_string();
        let scope_id = task
            .param_str("scope_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("scope_{}_{}", task.span.start, task.span.end));

        let scope = Scope {
            id: scope_id.clone(),
            kind,
            speaker,
            parent_id: state.current_scope_id.clone(),
            span: task.span,
        };
        state.push_scope(scope);

        Ok(OperatorResult::success()
            .with_mutation(format!("pushed scope {} ({:?})", scope_id, kind)))
    }
}

/// Primitive: pop the current scope from the stack.
pub struct PopScope;

impl Method for PopScope {
    fn name(&self) -> &'static str {
        "PopScope"
    }

    fn task_type(&self) -> &'static str {
        task_types::POP_SCOPE
    }

    fn preconditions(&self, state: &DiscourseState, _task: &Task) -> bool {
        state.scope_depth() > 0
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
        _task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        match state.pop_scope() {
            Some(popped) => Ok(OperatorResult::success()
                .with_mutation(format!("popped scope {} ({:?})", popped.id, popped.kind))),
            None => Ok(OperatorResult::failed("no scope to pop")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SpeakerTurn;
    use std::collections::BTreeMap;

    fn three_turn_state() -> DiscourseState {
        let turns = vec![
            SpeakerTurn { speaker: "A".into(), text: "One.".into(), span: Span::new(0, 4), turn_index: 0 },
            SpeakerTurn { speaker: "B".into(), text: "Two.".into(), span: Span::new(5, 9), turn_index: 1 },
            SpeakerTurn { speaker: "A".into(), text: "Three.".into(), span: Span::new(10, 16), turn_index: 2 },
        ];
        DiscourseState::from_transcript("t1", "One. Two. Three.", turns)
    }

    #[test]
    fn test_decompose_transcript_one_subtask_per_turn() {
        let state = three_turn_state();
        let root = super::super::transcript_root_task(16);
        let subtasks = DecomposeTranscript.decompose(&state, &root);
        assert_eq!(subtasks.len(), 3);
        assert!(subtasks.iter().all(|t| t.task_type == task_types::PROCESS_TURN));
        assert_eq!(subtasks[0].param_u64("turn_index"), Some(0));
        assert_eq!(subtasks[2].param_u64("turn_index"), Some(2));
    }

    #[test]
    fn test_segment_on_markers_splits_at_marker() {
        let segments = segment_on_markers(
            "The data is clear. However, the sample was small.",
            Span::new(100, 149),
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].1, "The data is clear.");
        assert!(segments[1].1.starts_with("However"));
        assert_eq!(segments[0].0.start, 100);
        assert_eq!(segments[1].0.start, 119);
    }

    #[test]
    fn test_segment_without_marker_returns_whole_text() {
        let segments = segment_on_markers("Just one thought here.", Span::new(0, 22));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].1, "Just one thought here.");
    }

    #[test]
    fn test_pop_scope_requires_open_scope() {
        let state = DiscourseState::default();
        let task = Task::new(task_types::POP_SCOPE, BTreeMap::new(), Span::new(0, 1));
        assert!(!PopScope.preconditions(&state, &task));
    }
}
