//! Open reference tracking for coreference resolution.

use serde::{Deserialize, Serialize};

use crate::artifact::ReferenceKind;
use crate::state::entity::EntityId;
use crate::state::scope::ScopeId;
use crate::task::Span;

/// Identifier for a tracked reference.
pub type RefId = String;

/// An unresolved referring expression awaiting resolution.
///
/// A reference is either open (listed here) or resolved (present in the
/// resolved map), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenReference {
    pub id: RefId,
    pub ref_type: ReferenceKind,
    /// Surface text: "this", "he", "the study".
    pub surface_form: String,
    pub span: Span,
    pub scope_id: Option<ScopeId>,
    /// Candidate entity ids gathered so far, with parallel scores.
    pub candidates: Vec<EntityId>,
    pub scores: Vec<f64>,
}

impl OpenReference {
    pub fn new(
        id: impl Into<RefId>,
        ref_type: ReferenceKind,
        surface_form: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            id: id.into(),
            ref_type,
            surface_form: surface_form.into(),
            span,
            scope_id: None,
            candidates: Vec::new(),
            scores: Vec::new(),
        }
    }
}
