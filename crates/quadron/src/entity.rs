use std::time::Instant;

use crate::identifier::Identifier;
use crate::position::Position;

/// Attributes of a moving object participating in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub identifier: Identifier,
    pub position: Position,
    pub aoi_radius: i64,
}

impl Entity {
    pub fn new(identifier: Identifier, position: Position, aoi_radius: i64) -> Self {
        Self {
            identifier,
            position,
            aoi_radius,
        }
    }
}

/// What a node knows about another peer: the entity itself, when it was
/// last heard from, and whether it asked to be kept updated because it holds
/// us as one of its binding neighbors.
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub entity: Entity,
    pub last_contact: Instant,
    pub requested_updates: bool,
}

impl RemoteEntity {
    /// A freshly discovered peer, before any position is known.
    pub fn new(identifier: Identifier, now: Instant) -> Self {
        Self {
            entity: Entity::new(identifier, Position::default(), 0),
            last_contact: now,
            requested_updates: false,
        }
    }
}
