pub mod events;
pub mod messages;
pub mod player;
pub mod room;
pub mod round;
pub mod snapshot;
pub mod state;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::Player;
    use crate::room::Room;
    use crate::state::GameState;

    /// Create `n` test players named player1..playerN with sequential ids.
    pub fn make_players(n: usize) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(format!("p{i}"), format!("player{i}"), format!("conn-{i}")))
            .collect()
    }

    /// Create a game state for `code` populated with `n` players.
    pub fn make_state(code: &str, n: usize) -> GameState {
        let mut state = GameState::new(Room::new(code));
        state.room.players = make_players(n);
        state
    }
}
