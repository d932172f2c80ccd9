use serde::{Deserialize, Serialize};

/// A player inside a room. The username identifies a player across
/// reconnects; `connection` is the transport's opaque handle and is
/// reassigned whenever the player reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub username: String,
    pub connection: String,
    pub score: u32,
}

impl Player {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            connection: connection.into(),
            score: 0,
        }
    }
}
