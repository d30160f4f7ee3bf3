//! Artifact family: immutable, identity-addressed output records.
//!
//! Operators emit artifacts into the Discourse State's append-only store.
//! An artifact is never mutated after emission, only referenced by id;
//! re-emitting an id that already exists is a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::entity::EntityId;
use crate::state::scope::ScopeId;
use crate::task::{Span, TaskId};

/// Identifier for an emitted artifact (opaque string, content-derived).
pub type ArtifactId = String;

/// Confidence below which a claim is auto-flagged for review.
pub const REVIEW_CONFIDENCE_FLOOR: f64 = 0.6;

/// Default commit threshold for reference resolutions.
pub const DEFAULT_COMMIT_THRESHOLD: f64 = 0.85;

/// Best-candidate score below which a resolution starts out ambiguous.
pub const TENTATIVE_SCORE_FLOOR: f64 = 0.5;

/// Two candidates scoring within this margin of each other means no
/// candidate clearly wins.
pub const AMBIGUITY_MARGIN: f64 = 0.1;

/// Which task and method created an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub created_by_task: Option<TaskId>,
    pub created_by_method: Option<String>,
}

impl Provenance {
    pub fn new(task_id: impl Into<TaskId>, method: impl Into<String>) -> Self {
        Self {
            created_by_task: Some(task_id.into()),
            created_by_method: Some(method.into()),
        }
    }
}

/// An emitted artifact: identity, provenance and a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub provenance: Provenance,
    pub payload: ArtifactPayload,
}

impl Artifact {
    pub fn new(id: impl Into<ArtifactId>, provenance: Provenance, payload: ArtifactPayload) -> Self {
        Self {
            id: id.into(),
            provenance,
            payload,
        }
    }

    /// Type tag derived from the concrete payload kind.
    pub fn artifact_type(&self) -> &'static str {
        match &self.payload {
            ArtifactPayload::Claim(_) => "AtomicClaim",
            ArtifactPayload::Frame(_) => "ArgumentFrame",
            ArtifactPayload::Diagnostic(_) => "Diagnostic",
            ArtifactPayload::Resolution(_) => "TentativeResolution",
        }
    }

    pub fn as_claim(&self) -> Option<&AtomicClaim> {
        match &self.payload {
            ArtifactPayload::Claim(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&ArgumentFrame> {
        match &self.payload {
            ArtifactPayload::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_diagnostic(&self) -> Option<&Diagnostic> {
        match &self.payload {
            ArtifactPayload::Diagnostic(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_resolution(&self) -> Option<&TentativeResolution> {
        match &self.payload {
            ArtifactPayload::Resolution(r) => Some(r),
            _ => None,
        }
    }
}

/// Closed union over the artifact kinds the engine can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArtifactPayload {
    Claim(AtomicClaim),
    Frame(ArgumentFrame),
    Diagnostic(Diagnostic),
    Resolution(TentativeResolution),
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Claim taxonomy. Only checkable kinds are routed to verification;
/// `Unclassified` goes to the caller's review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Empirical,
    Methodological,
    Normative,
    Conceptual,
    Introspective,
    Predictive,
    Philosophical,
    Unclassified,
}

impl Default for ClaimType {
    fn default() -> Self {
        Self::Unclassified
    }
}

/// A single-predicate factual claim, the primary output of extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicClaim {
    pub text: String,
    pub span: Span,
    pub claim_type: ClaimType,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub confidence_reasons: Vec<String>,
    pub speaker: Option<String>,
    pub scope_id: Option<ScopeId>,
    pub parent_frame_id: Option<ArtifactId>,
    pub requires_review: bool,
}

impl AtomicClaim {
    pub fn new(text: impl Into<String>, span: Span, claim_type: ClaimType, confidence: f64) -> Self {
        let requires_review =
            claim_type == ClaimType::Unclassified || confidence < REVIEW_CONFIDENCE_FLOOR;
        Self {
            text: text.into(),
            span,
            claim_type,
            confidence,
            confidence_reasons: Vec::new(),
            speaker: None,
            scope_id: None,
            parent_frame_id: None,
            requires_review,
        }
    }

    /// True if this claim should be routed to external verification.
    pub fn is_checkable(&self) -> bool {
        matches!(
            self.claim_type,
            ClaimType::Empirical | ClaimType::Methodological | ClaimType::Predictive
        )
    }
}

// ---------------------------------------------------------------------------
// Argument frames
// ---------------------------------------------------------------------------

/// Role a frame plays relative to its parent. Frames form a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameRole {
    Claim,
    Support,
    Rebuttal,
}

impl Default for FrameRole {
    fn default() -> Self {
        Self::Claim
    }
}

/// A structured argument grouping claims and sub-frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentFrame {
    pub summary: String,
    pub role: FrameRole,
    pub speaker: Option<String>,
    /// Constituent spans covered by this frame.
    pub spans: Vec<Span>,
    pub child_claim_ids: Vec<ArtifactId>,
    pub child_frame_ids: Vec<ArtifactId>,
    pub parent_frame_id: Option<ArtifactId>,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// What kind of planner condition a diagnostic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    NoApplicableMethod,
    HardBudgetExceeded,
    SoftBudgetExceeded,
    OperatorFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Diagnostic information emitted during planning: no-method drops,
/// budget trips, operator failures. Surfaced in the normal artifact
/// list, never as an error to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub context: BTreeMap<String, Value>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            severity,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Reference resolutions
// ---------------------------------------------------------------------------

/// Kind of referring expression awaiting resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Pronoun,
    Demonstrative,
    DefiniteNp,
    Ellipsis,
}

/// Commit state of a reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    /// Best guess, not committed.
    Tentative,
    /// High confidence, locked in.
    Committed,
    /// Multiple candidates without a clear winner; needs a human.
    Ambiguous,
    /// No candidates found.
    Unresolved,
}

/// One scored candidate entity for a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub entity_id: EntityId,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Reference resolution with first-class uncertainty.
///
/// Stored once: the artifact store holds the record, and the Discourse
/// State's resolved-reference map points at it by artifact id, so internal
/// decisions and exported output cannot drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TentativeResolution {
    pub source_text: String,
    pub source_span: Span,
    pub ref_type: ReferenceKind,
    pub status: ResolutionStatus,
    pub winner: Option<EntityId>,
    pub confidence: f64,
    pub candidates: Vec<ScoredCandidate>,
    pub scoring_features: BTreeMap<String, f64>,
    pub reason: String,
    /// Root-to-leaf method names that contributed to this resolution.
    pub method_path: Vec<String>,
    pub allow_auto_commit: bool,
}

impl TentativeResolution {
    /// Build a resolution from scored candidates (highest score first).
    /// The initial status is `Unresolved` with no candidates, `Ambiguous`
    /// below the tentative floor, and `Tentative` otherwise.
    pub fn from_candidates(
        source_text: impl Into<String>,
        source_span: Span,
        ref_type: ReferenceKind,
        candidates: Vec<ScoredCandidate>,
        reason: impl Into<String>,
    ) -> Self {
        let (status, winner, confidence) = match candidates.first() {
            None => (ResolutionStatus::Unresolved, None, 0.0),
            Some(best) if best.score < TENTATIVE_SCORE_FLOOR => {
                (ResolutionStatus::Ambiguous, Some(best.entity_id.clone()), best.score)
            }
            Some(best) => (ResolutionStatus::Tentative, Some(best.entity_id.clone()), best.score),
        };
        Self {
            source_text: source_text.into(),
            source_span,
            ref_type,
            status,
            winner,
            confidence,
            candidates,
            scoring_features: BTreeMap::new(),
            reason: reason.into(),
            method_path: Vec::new(),
            allow_auto_commit: true,
        }
    }

    /// True if the resolution meets the commit threshold.
    pub fn should_commit(&self, threshold: f64) -> bool {
        self.status == ResolutionStatus::Tentative
            && self.confidence >= threshold
            && self.allow_auto_commit
    }

    /// Advance the commit state machine one step.
    ///
    /// `Tentative` becomes `Committed` at or above the threshold (when
    /// auto-commit is allowed), or `Ambiguous` when the runner-up scores
    /// within the ambiguity margin of the winner. Every other status is a
    /// fixed point.
    pub fn evaluate(&mut self, threshold: f64) {
        if self.status != ResolutionStatus::Tentative {
            return;
        }
        if self.should_commit(threshold) {
            self.status = ResolutionStatus::Committed;
            return;
        }
        if let [best, runner_up, ..] = self.candidates.as_slice() {
            if (best.score - runner_up.score).abs() < AMBIGUITY_MARGIN {
                self.status = ResolutionStatus::Ambiguous;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            entity_id: id.to_string(),
            score,
            reasons: vec![],
        }
    }

    #[test]
    fn test_artifact_type_derived_from_payload() {
        let artifact = Artifact::new(
            "claim_x",
            Provenance::default(),
            ArtifactPayload::Claim(AtomicClaim::new("t", Span::new(0, 1), ClaimType::Empirical, 0.9)),
        );
        assert_eq!(artifact.artifact_type(), "AtomicClaim");
        assert!(artifact.as_claim().is_some());
        assert!(artifact.as_frame().is_none());
    }

    #[test]
    fn test_claim_review_flags() {
        assert!(AtomicClaim::new("t", Span::new(0, 1), ClaimType::Unclassified, 0.9).requires_review);
        assert!(AtomicClaim::new("t", Span::new(0, 1), ClaimType::Empirical, 0.4).requires_review);
        assert!(!AtomicClaim::new("t", Span::new(0, 1), ClaimType::Empirical, 0.8).requires_review);
    }

    #[test]
    fn test_claim_checkable_routing() {
        assert!(AtomicClaim::new("t", Span::new(0, 1), ClaimType::Predictive, 0.7).is_checkable());
        assert!(!AtomicClaim::new("t", Span::new(0, 1), ClaimType::Normative, 0.7).is_checkable());
    }

    #[test]
    fn test_resolution_commits_at_threshold() {
        let mut r = TentativeResolution::from_candidates(
            "he",
            Span::new(0, 2),
            ReferenceKind::Pronoun,
            vec![candidate("a", 0.9), candidate("b", 0.2)],
            "",
        );
        assert_eq!(r.status, ResolutionStatus::Tentative);
        r.evaluate(DEFAULT_COMMIT_THRESHOLD);
        assert_eq!(r.status, ResolutionStatus::Committed);
        assert_eq!(r.winner.as_deref(), Some("a"));
    }

    #[test]
    fn test_resolution_stays_tentative_below_threshold() {
        let mut r = TentativeResolution::from_candidates(
            "he",
            Span::new(0, 2),
            ReferenceKind::Pronoun,
            vec![candidate("a", 0.7), candidate("b", 0.2)],
            "",
        );
        r.evaluate(DEFAULT_COMMIT_THRESHOLD);
        assert_eq!(r.status, ResolutionStatus::Tentative);
    }

    #[test]
    fn test_resolution_ambiguous_without_clear_winner() {
        let mut r = TentativeResolution::from_candidates(
            "this",
            Span::new(0, 4),
            ReferenceKind::Demonstrative,
            vec![candidate("a", 0.6), candidate("b", 0.55)],
            "",
        );
        r.evaluate(DEFAULT_COMMIT_THRESHOLD);
        assert_eq!(r.status, ResolutionStatus::Ambiguous);
    }

    #[test]
    fn test_resolution_respects_auto_commit_flag() {
        let mut r = TentativeResolution::from_candidates(
            "she",
            Span::new(0, 3),
            ReferenceKind::Pronoun,
            vec![candidate("a", 0.95)],
            "",
        );
        r.allow_auto_commit = false;
        r.evaluate(DEFAULT_COMMIT_THRESHOLD);
        assert_eq!(r.status, ResolutionStatus::Tentative);
    }

    #[test]
    fn test_resolution_unresolved_without_candidates() {
        let r = TentativeResolution::from_candidates(
            "it",
            Span::new(0, 2),
            ReferenceKind::Pronoun,
            vec![],
            "no candidates in scope",
        );
        assert_eq!(r.status, ResolutionStatus::Unresolved);
        assert!(r.winner.is_none());
    }
}
