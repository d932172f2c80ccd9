use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::room::Room;
use crate::round::Round;

/// The full serializable state of one room: the aggregate root that
/// snapshots capture and restore. Confirmations are a set keyed by
/// username, cleared at every round boundary. The round-advance timer is
/// deliberately NOT part of this struct; it lives in a side table inside
/// the registry so serialization never has to exclude it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub room: Room,
    pub rounds: Vec<Round>,
    pub confirmations: BTreeSet<String>,
}

impl GameState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            rounds: Vec::new(),
            confirmations: BTreeSet::new(),
        }
    }

    /// The latest (open) round, if any round has been created.
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds.last_mut()
    }
}
