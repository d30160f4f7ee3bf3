//! Scope and salience tracking for nested argument structure.

use serde::{Deserialize, Serialize};

use crate::state::entity::EntityId;
use crate::task::Span;

/// Identifier for a discourse scope.
pub type ScopeId = String;

/// What kind of discourse region a scope covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Turn,
    Argument,
    Support,
    Rebuttal,
    Quote,
    Hypothetical,
}

impl ScopeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TURN" => Some(Self::Turn),
            "ARGUMENT" => Some(Self::Argument),
            "SUPPORT" => Some(Self::Support),
            "REBUTTAL" => Some(Self::Rebuttal),
            "QUOTE" => Some(Self::Quote),
            "HYPOTHETICAL" => Some(Self::Hypothetical),
            _ => None,
        }
    }
}

/// A scope in the discourse structure: a speaker turn, nested argument,
/// quoted speech or hypothetical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub speaker: String,
    pub parent_id: Option<ScopeId>,
    pub span: Span,
}

/// Salience tracking within one scope: entity ids ordered by recency,
/// most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalienceFrame {
    pub scope_id: ScopeId,
    pub speaker: String,
    pub entities: Vec<EntityId>,
}

impl SalienceFrame {
    pub fn new(scope_id: impl Into<ScopeId>, speaker: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            speaker: speaker.into(),
            entities: Vec::new(),
        }
    }

    /// Move an entity to the top of the salience ordering.
    pub fn boost(&mut self, entity_id: &EntityId) {
        self.entities.retain(|e| e != entity_id);
        self.entities.insert(0, entity_id.clone());
    }

    pub fn top(&self, n: usize) -> &[EntityId] {
        &self.entities[..n.min(self.entities.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_moves_to_front_without_duplicating() {
        let mut frame = SalienceFrame::new("turn_0", "A");
        frame.boost(&"e1".to_string());
        frame.boost(&"e2".to_string());
        frame.boost(&"e1".to_string());
        assert_eq!(frame.entities, vec!["e1".to_string(), "e2".to_string()]);
        assert_eq!(frame.top(1), &["e1".to_string()]);
    }
}
