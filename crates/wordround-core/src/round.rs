use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-player answers for one round: category name → answer text.
pub type AnswerSheet = HashMap<String, String>;

/// Alphabet the round letter is drawn from.
const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One timed unit of play. The letter is drawn uniformly at random when the
/// round opens; answers arrive keyed by username, at most one sheet each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u32,
    pub letter: char,
    pub answers: HashMap<String, AnswerSheet>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(round_number: u32, letter: char) -> Self {
        Self {
            round_number,
            letter,
            answers: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Draw a round letter uniformly from `A..=Z`.
pub fn draw_letter() -> char {
    let mut rng = rand::rng();
    LETTERS[rng.random_range(0..LETTERS.len())] as char
}
