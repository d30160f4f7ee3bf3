//! The mutable blackboard and its working-memory records.

pub mod discourse;
pub mod entity;
pub mod reference;
pub mod scope;

pub use discourse::{DiscourseState, PendingFrame, PendingRelation, SpeakerTurn};
pub use entity::{Entity, EntityId, EntityKind, EntityMention};
pub use reference::{OpenReference, RefId};
pub use scope::{SalienceFrame, Scope, ScopeId, ScopeKind};
