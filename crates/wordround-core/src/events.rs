use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized domain event types for the per-room audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "player.joined")]
    PlayerJoined,
    #[serde(rename = "player.left")]
    PlayerLeft,
    #[serde(rename = "game.started")]
    GameStarted,
    #[serde(rename = "round.started")]
    RoundStarted,
    #[serde(rename = "round.finished")]
    RoundFinished,
    #[serde(rename = "answer.submitted")]
    AnswerSubmitted,
    #[serde(rename = "timer.expired")]
    TimerExpired,
    #[serde(rename = "all.confirmed")]
    AllConfirmed,
    #[serde(rename = "milestone.snapshot")]
    MilestoneSnapshot,
}

/// One append-only log entry for a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }
}
