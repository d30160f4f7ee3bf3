//! Entity and mention tracking.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::scope::ScopeId;
use crate::task::Span;

/// Identifier for a canonical entity (its dedup key).
pub type EntityId = String;

/// Broad entity classification used by the resolution heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Study,
    Concept,
    Claim,
    Unknown,
}

impl Default for EntityKind {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A single mention of an entity in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub entity_id: EntityId,
    pub span: Span,
    pub surface_form: String,
    pub scope_id: Option<ScopeId>,
}

/// A canonical entity tracked across the transcript.
///
/// Entities are registered through the Discourse State, which merges
/// re-registrations of the same canonical name: entities only grow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub canonical: String,
    /// Lowercased alternative surface forms. `BTreeSet` keeps iteration
    /// deterministic.
    pub aliases: BTreeSet<String>,
    pub kind: EntityKind,
    pub first_mention_span: Span,
    pub introducing_speaker: Option<String>,
    pub mention_spans: Vec<Span>,
}

impl Entity {
    pub fn new(canonical: impl Into<String>, kind: EntityKind, first_mention_span: Span) -> Self {
        Self {
            id: EntityId::new(),
            canonical: canonical.into(),
            aliases: BTreeSet::new(),
            kind,
            first_mention_span,
            introducing_speaker: None,
            mention_spans: vec![first_mention_span],
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.introducing_speaker = Some(speaker.into());
        self
    }

    pub fn add_alias(&mut self, alias: &str) {
        self.aliases.insert(alias.trim().to_lowercase());
    }

    /// True if `text` matches the canonical name or any alias.
    pub fn matches(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        normalized == self.canonical.to_lowercase() || self.aliases.contains(&normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_matches_canonical_and_aliases() {
        let mut entity = Entity::new("Dr. Smith", EntityKind::Person, Span::new(0, 9));
        entity.add_alias("SMITH ");
        assert!(entity.matches("dr. smith"));
        assert!(entity.matches("smith"));
        assert!(!entity.matches("jones"));
    }
}
