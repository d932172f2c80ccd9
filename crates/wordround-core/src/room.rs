use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::Player;

/// Characters used in generated room codes. Uppercase alphanumerics with
/// ambiguous glyphs (I, O, 0, 1) removed.
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated room code.
pub const CODE_LEN: usize = 6;

/// Durable lifecycle status of a room, stamped by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
    Cancelled,
}

/// One game room. Codes are unique case-insensitively across live rooms;
/// `current_round` stays 0 until the room becomes active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub players: Vec<Player>,
    pub current_round: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: normalize_code(&code.into()),
            players: Vec::new(),
            current_round: 0,
            is_active: false,
            created_at: Utc::now(),
        }
    }

    /// Look up a player by username.
    pub fn player(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }
}

/// Canonical form of a room code: uppercase, surrounding whitespace stripped.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Generate a random room code. Uniqueness against live rooms is the
/// caller's responsibility.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Check that a code has the generated shape (length and character set).
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_CHARS.contains(&b))
}
