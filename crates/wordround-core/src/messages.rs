use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::round::AnswerSheet;

/// Outbound notifications produced by the engine and consumed by the
/// transport layer, which maps each to its room subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    /// Full current roster after any join/leave/reconnect.
    PlayerList(Vec<Player>),
    GameReadyToStart(GameReadyMsg),
    GameStarted(GameStartedMsg),
    PlayerConfirmed(PlayerConfirmedMsg),
    RoundFinished(RoundFinishedMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReadyMsg {
    pub time_left: u64,
    pub total_players: usize,
    pub is_new_round: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartedMsg {
    pub letter: char,
    pub auto_started: bool,
    pub round_number: u32,
    pub is_new_round: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfirmedMsg {
    pub username: String,
    pub confirmed_players: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundFinishedMsg {
    pub finished_by: String,
    pub answers_by_player: HashMap<String, AnswerSheet>,
    pub letter: char,
    pub scores: HashMap<String, u32>,
    pub round_number: u32,
}

/// A notification addressed to one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomNotification {
    pub room: String,
    #[serde(flatten)]
    pub notification: Notification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_serialize_with_type_tag() {
        let msg = Notification::GameStarted(GameStartedMsg {
            letter: 'R',
            auto_started: true,
            round_number: 1,
            is_new_round: false,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "game_started");
        assert_eq!(json["payload"]["letter"], "R");
        assert_eq!(json["payload"]["auto_started"], true);
    }

    #[test]
    fn room_notification_flattens_payload() {
        let msg = RoomNotification {
            room: "ABCDEF".to_string(),
            notification: Notification::PlayerConfirmed(PlayerConfirmedMsg {
                username: "alice".to_string(),
                confirmed_players: vec!["alice".to_string()],
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["room"], "ABCDEF");
        assert_eq!(json["type"], "player_confirmed");
    }
}
