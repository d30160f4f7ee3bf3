//! Claim extraction: segment gating, sentence splitting and heuristic
//! claim typing.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{scaled_cost, task_types, trimmed_with_offset, turn_params};
use crate::artifact::{Artifact, ArtifactPayload, AtomicClaim, ClaimType, Provenance};
use crate::canonical::claim_dedup_key;
use crate::error::MethodError;
use crate::registry::Method;
use crate::result::OperatorResult;
use crate::state::{DiscourseState, Entity, EntityKind};
use crate::task::{Span, Task};

/// Patterns that indicate a sentence likely carries a factual claim.
static CLAIM_INDICATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b\d+% |
        \b\d{4}\b |
        \b\d+\s*(milliseconds?|seconds?|minutes?|hours?|days?|weeks?|months?|years?)\b |
        \b\d+\s*(percent|million|billion|thousand)\b |
        \bstud(y|ies)\b | \bresearch\b | \bdata\b | \bevidence\b |
        \bshows?\b | \bproves?\b | \bdemonstrates?\b | \bfound\b |
        \bmeasured?\b | \bprecedes?\b | \bcauses?\b | \baffects?\b",
    )
    .expect("claim indicator pattern")
});

static STATISTICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+%|\b\d+\s*(percent|million|billion|thousand)").expect("statistical pattern")
});

static INTROSPECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^i (think|believe|feel|know)").expect("introspective pattern"));

const CLAIM_VERBS: [&str; 8] = ["is", "are", "was", "were", "has", "have", "shows", "proves"];

/// Compound: split a segment into sentences and create one extraction
/// task per claim-like sentence.
pub struct ExtractClaimsFromSegment;

impl Method for ExtractClaimsFromSegment {
    fn name(&self) -> &'static str {
        "ExtractClaimsFromSegment"
    }

    fn task_type(&self) -> &'static str {
        task_types::EXTRACT_CLAIMS_FROM_SEGMENT
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        task.param_str("text").map_or(false, |t| t.trim().len() > 10)
    }

    fn cost(&self, _state: &DiscourseState, task: &Task) -> f64 {
        scaled_cost(5.0, task)
    }

    fn decompose(&self, _state: &DiscourseState, task: &Task) -> Vec<Task> {
        let text = task.param_str("text").unwrap_or_default();
        let speaker = task.param_str("speaker").unwrap_or("UNKNOWN");
        let turn_index = task.param_u64("turn_index").unwrap_or(0) as usize;

        split_sentences(text)
            .into_iter()
            .filter(|(_, sentence)| looks_like_claim(sentence))
            .map(|(offset, sentence)| {
                let start = task.span.start + offset;
                let mut params = turn_params(turn_index, speaker);
                params.insert("text".to_string(), serde_json::json!(sentence));
                Task::new(
                    task_types::EXTRACT_ATOMIC_CLAIM,
                    params,
                    Span::new(start, start + sentence.len()),
                )
            })
            .collect()
    }

    /// Reached when no sentence passed the claim gate: an empty
    /// decomposition routes here, and finding nothing is not a failure.
    fn execute(
        &self,
        _state: &mut DiscourseState,
        _task: &Task,
    ) -> Result<OperatorResult, MethodError> {
        Ok(OperatorResult::success().with_mutation("no claim-like sentences in segment"))
    }
}

/// Primitive: extract a single atomic claim with a heuristic type.
pub struct ExtractAtomicClaim;

impl Method for ExtractAtomicClaim {
    fn name(&self) -> &'static str {
        "ExtractAtomicClaim"
    }

    fn task_type(&self) -> &'static str {
        task_types::EXTRACT_ATOMIC_CLAIM
    }

    fn preconditions(&self, _state: &DiscourseState, task: &Task) -> bool {
        !task.span.is_empty() && task.param_str("text").map_or(false, |t| t.trim().len() > 5)
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
        let text = task
            .param_str("text")
            .ok_or_else(|| MethodError::MissingParam("text".to_string()))?
            .trim()
            .to_string();
        let speaker = task.param_str("speaker").map(str::to_string);

        let (claim_type, confidence, reasons) = classify_claim(&text);

        let claim_id = format!("claim_{}", claim_dedup_key(&text, task.span));
        let frame_id = state.current_frame_id();

        let mut claim = AtomicClaim::new(&text, task.span, claim_type, confidence);
        claim.confidence_reasons = reasons;
        claim.speaker = speaker.clone();
        claim.scope_id = state.current_scope_id.clone();
        claim.parent_frame_id = frame_id.clone();

        state.emit_artifact(Artifact::new(
            claim_id.clone(),
            Provenance::new(task.id.clone(), self.name()),
            ArtifactPayload::Claim(claim),
        ));
        state.link_claim_to_current_frame(&claim_id);

        // Register the claim as an entity so demonstratives ("this",
        // "that") can resolve to it later.
        let canonical = truncate_chars(&text, 50);
        let mut entity = Entity::new(canonical, EntityKind::Claim, task.span);
        if let Some(s) = &speaker {
            entity = entity.with_speaker(s.clone());
        }
        let entity_id = state.register_entity(entity);
        state.boost_salience(&entity_id);

        let mut result = OperatorResult::success()
            .with_artifact(claim_id)
            .with_mutation(format!("emitted claim: {}", truncate_chars(&text, 50)))
            .with_mutation(format!("registered claim as entity {}", entity_id));
        if let Some(frame) = frame_id {
            result = result.with_mutation(format!("linked to frame {}", frame));
        }
        Ok(result)
    }
}

/// Split text into sentences at `[.!?]` + whitespace + uppercase
/// boundaries. Returns (offset within `text`, sentence).
fn split_sentences(text: &str) -> Vec<(usize, &str)> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let after_punct = i + c.len_utf8();
        let rest = &text[after_punct..];
        let ws_len: usize = rest
            .chars()
            .take_while(|ch| ch.is_whitespace())
            .map(char::len_utf8)
            .sum();
        if ws_len == 0 {
            continue;
        }
        let next_is_upper = rest[ws_len..].chars().next().is_some_and(char::is_uppercase);
        if next_is_upper && after_punct > start {
            if let Some((offset, sentence)) = trimmed_with_offset(start, &text[start..after_punct]) {
                sentences.push((offset, sentence));
            }
            start = after_punct + ws_len;
        }
    }

    if start < text.len() {
        if let Some((offset, sentence)) = trimmed_with_offset(start, &text[start..]) {
            sentences.push((offset, sentence));
        }
    }

    sentences
}

/// Gate: does this sentence look like it contains a factual claim?
fn looks_like_claim(text: &str) -> bool {
    let lower = text.to_lowercase();
    if CLAIM_INDICATORS.is_match(&lower) {
        return true;
    }
    if text.split_whitespace().count() < 5 {
        return false;
    }
    CLAIM_VERBS.iter().any(|verb| lower.contains(&format!(" {} ", verb)))
}

/// Heuristic claim typing with confidence and reasons.
fn classify_claim(text: &str) -> (ClaimType, f64, Vec<String>) {
    let lower = text.to_lowercase();

    if STATISTICAL.is_match(&lower) {
        return (
            ClaimType::Empirical,
            0.85,
            vec!["contains numeric/statistical data".to_string()],
        );
    }
    if ["methodology", "sample", "controlled", "experiment", "study design"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return (
            ClaimType::Methodological,
            0.8,
            vec!["contains methodology keywords".to_string()],
        );
    }
    if ["study", "research", "data", "evidence", "found", "measured"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return (
            ClaimType::Empirical,
            0.75,
            vec!["contains empirical keywords".to_string()],
        );
    }
    if ["should", "ought", "must", "wrong", "right"].iter().any(|w| lower.contains(w)) {
        return (
            ClaimType::Normative,
            0.8,
            vec!["contains normative language".to_string()],
        );
    }
    if ["free will", "consciousness", "determinism", "existence", "meaning"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return (
            ClaimType::Philosophical,
            0.85,
            vec!["contains philosophical keywords".to_string()],
        );
    }
    if INTROSPECTIVE.is_match(&lower) {
        return (
            ClaimType::Introspective,
            0.9,
            vec!["first-person mental state".to_string()],
        );
    }
    if ["will", "going to", "might", "probably"].iter().any(|w| lower.contains(w)) {
        return (
            ClaimType::Predictive,
            0.7,
            vec!["contains predictive language".to_string()],
        );
    }

    (
        ClaimType::Unclassified,
        0.3,
        vec!["no strong pattern match".to_string()],
    )
}

/// Char-safe prefix of at most `n` characters.
fn truncate_chars(text: &str, n: usize) -> String {
    if text.chars().count() <= n {
        return text.to_string();
    }
    let mut prefix: String = text.chars().take(n).collect();
    prefix.push_str("...");
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_with_offsets() {
        let sentences = split_sentences("The study found 40%. But critics disagree. Loudly.");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], (0, "The study found 40%."));
        assert_eq!(sentences[1], (21, "But critics disagree."));
        assert_eq!(sentences[2], (43, "Loudly."));
    }

    #[test]
    fn test_split_sentences_lowercase_continuation_kept_together() {
        let sentences = split_sentences("It grew 3.5 percent overall.");
        assert_eq!(sentences, vec![(0, "It grew 3.5 percent overall.")]);
    }

    #[test]
    fn test_split_sentences_no_boundary() {
        assert_eq!(split_sentences("no terminal here"), vec![(0, "no terminal here")]);
    }

    #[test]
    fn test_looks_like_claim_gating() {
        assert!(looks_like_claim("Unemployment decreased by 15%."));
        assert!(looks_like_claim("The study found a strong effect."));
        assert!(looks_like_claim("This town is larger than it looks today."));
        assert!(!looks_like_claim("Hello there!"));
    }

    #[test]
    fn test_classify_claim_types() {
        assert_eq!(classify_claim("Crime fell 15% last year.").0, ClaimType::Empirical);
        assert_eq!(
            classify_claim("The sample was not controlled properly.").0,
            ClaimType::Methodological
        );
        assert_eq!(classify_claim("We should ban this outright.").0, ClaimType::Normative);
        assert_eq!(classify_claim("Free will does not exist.").0, ClaimType::Philosophical);
        assert_eq!(classify_claim("I think he lied.").0, ClaimType::Introspective);
        assert_eq!(classify_claim("It might rain next week.").0, ClaimType::Predictive);
        let (kind, confidence, _) = classify_claim("Cats like boxes maybe.");
        assert_eq!(kind, ClaimType::Unclassified);
        assert!(confidence < 0.5);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 50), "short");
        let long = "x".repeat(60);
        let truncated = truncate_chars(&long, 50);
        assert_eq!(truncated.chars().count(), 53);
        assert!(truncated.ends_with("..."));
    }
}
