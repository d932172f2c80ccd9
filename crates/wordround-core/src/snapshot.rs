use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::GameState;

/// Immutable point-in-time capture of a room's full state. The state field
/// is everything needed to rehydrate the room after a restart; snapshots
/// outlive the in-memory game and are pruned only by explicit retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub room_code: String,
    pub round_number: u32,
    pub created_at: DateTime<Utc>,
    pub state: GameState,
}

impl Snapshot {
    pub fn capture(state: &GameState) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_code: state.room.code.clone(),
            round_number: state.room.current_round,
            created_at: Utc::now(),
            state: state.clone(),
        }
    }
}
