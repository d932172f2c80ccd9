use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use wordround_core::player::Player;
use wordround_core::room::{Room, normalize_code};
use wordround_core::round::{AnswerSheet, Round};
use wordround_core::state::GameState;

use crate::error::RegistryError;

/// Shared handle to the registry. All mutations to a room's state happen
/// under this write lock, which serializes the timer-vs-quorum race.
pub type SharedRegistry = Arc<RwLock<SessionRegistry>>;

/// An open "waiting for confirmations" phase for a room. At most one per
/// room; resolving it (by timer expiry or quorum) consumes it, so exactly
/// one round can be created per phase.
struct ReadyPhase {
    generation: u64,
    is_new_round: bool,
    timer: Option<JoinHandle<()>>,
}

/// Outcome of claiming a ready phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedPhase {
    pub is_new_round: bool,
}

/// Authoritative in-memory map of live rooms to game state, plus the
/// non-serializable per-room timer side table.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, GameState>,
    ready: HashMap<String, ReadyPhase>,
    next_generation: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Create a fresh session. Fails if the code is already live; explicit
    /// deletion (last player leaving) is required before reuse.
    pub fn create_session(&mut self, code: &str) -> Result<Room, RegistryError> {
        let code = normalize_code(code);
        if self.sessions.contains_key(&code) {
            return Err(RegistryError::CodeExists(code));
        }
        let state = GameState::new(Room::new(code.clone()));
        let room = state.room.clone();
        self.sessions.insert(code, state);
        Ok(room)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.sessions.contains_key(&normalize_code(code))
    }

    pub fn state(&self, code: &str) -> Option<&GameState> {
        self.sessions.get(&normalize_code(code))
    }

    /// Owned copy of a room's state, None once the room is gone.
    pub fn state_cloned(&self, code: &str) -> Option<GameState> {
        self.state(code).cloned()
    }

    /// Insert a recovered state only if the room is not already live.
    /// Returns false (and drops the candidate) when present, which keeps
    /// recovery idempotent.
    pub fn insert_recovered(&mut self, state: GameState) -> bool {
        let code = state.room.code.clone();
        if self.sessions.contains_key(&code) {
            return false;
        }
        self.sessions.insert(code, state);
        true
    }

    /// Upsert a player by username. A returning player keeps their score;
    /// only the connection ref is replaced.
    pub fn add_player(&mut self, code: &str, player: Player) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        if let Some(existing) = state
            .room
            .players
            .iter_mut()
            .find(|p| p.username == player.username)
        {
            existing.connection = player.connection;
            existing.id = player.id;
        } else {
            state.room.players.push(player);
        }
        true
    }

    /// Remove a player by connection ref. Deleting the last player deletes
    /// the room and cancels any pending timer.
    pub fn remove_player(&mut self, code: &str, connection: &str) -> Option<Player> {
        let code = normalize_code(code);
        let state = self.sessions.get_mut(&code)?;
        let idx = state
            .room
            .players
            .iter()
            .position(|p| p.connection == connection)?;
        let removed = state.room.players.remove(idx);
        if state.room.players.is_empty() {
            self.sessions.remove(&code);
            self.cancel_round_timer(&code);
            tracing::info!(room = %code, "last player left, room destroyed");
        }
        Some(removed)
    }

    /// Activate a room holding at least `min_players`. Calling it again
    /// while the room is active (and still populated) is a no-op returning
    /// true.
    pub fn start_session(&mut self, code: &str, min_players: usize) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        if state.room.players.len() < min_players {
            return false;
        }
        if !state.room.is_active {
            state.room.is_active = true;
            state.room.current_round = 1;
        }
        true
    }

    /// Move to the next round and clear confirmations.
    pub fn advance_round(&mut self, code: &str) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        state.room.current_round += 1;
        state.confirmations.clear();
        true
    }

    pub fn record_confirmation(&mut self, code: &str, username: &str) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        state.confirmations.insert(username.to_string());
        true
    }

    pub fn all_confirmed(&self, code: &str) -> bool {
        self.state(code)
            .is_some_and(|s| s.confirmations.len() >= s.room.players.len())
    }

    pub fn list_confirmations(&self, code: &str) -> Vec<String> {
        self.state(code)
            .map(|s| s.confirmations.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append a round dated at the room's current round counter. Callers
    /// reach this only after a successful start/advance, so a missing room
    /// is a contract violation rather than a quiet no-op.
    pub fn create_round(&mut self, code: &str, letter: char) -> Result<Round, RegistryError> {
        let code = normalize_code(code);
        let state = self
            .sessions
            .get_mut(&code)
            .ok_or(RegistryError::RoomNotFound(code))?;
        let round = Round::new(state.room.current_round, letter);
        state.rounds.push(round.clone());
        Ok(round)
    }

    /// Attach a player's answer sheet to the latest round (overwriting any
    /// resubmission) and award `points`. False when no round is open.
    pub fn record_answer(
        &mut self,
        code: &str,
        username: &str,
        answers: AnswerSheet,
        points: u32,
    ) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        let Some(round) = state.rounds.last_mut() else {
            return false;
        };
        round.answers.insert(username.to_string(), answers);
        if let Some(player) = state
            .room
            .players
            .iter_mut()
            .find(|p| p.username == username)
        {
            player.score += points;
        }
        true
    }

    /// Stamp the latest round's end time. False when no round is open.
    pub fn close_round(&mut self, code: &str) -> bool {
        let Some(state) = self.sessions.get_mut(&normalize_code(code)) else {
            return false;
        };
        let Some(round) = state.rounds.last_mut() else {
            return false;
        };
        round.ended_at = Some(chrono::Utc::now());
        true
    }

    pub fn get_scores(&self, code: &str) -> HashMap<String, u32> {
        self.state(code)
            .map(|s| {
                s.room
                    .players
                    .iter()
                    .map(|p| (p.username.clone(), p.score))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_sessions(&self) -> Vec<Room> {
        self.sessions.values().map(|s| s.room.clone()).collect()
    }

    /// Locate a player across all live rooms. The caller uses this to
    /// enforce one-room-per-player before a join, removing the player from
    /// the old room first; the registry itself never does that silently.
    pub fn find_player(&self, username: &str) -> Option<(String, Player)> {
        self.sessions.iter().find_map(|(code, state)| {
            state
                .room
                .player(username)
                .map(|p| (code.clone(), p.clone()))
        })
    }

    // --- ready phase / round timer ------------------------------------

    /// Open a ready phase for the room, superseding (and cancelling) any
    /// previous one. Returns the phase generation the timer task must
    /// present to win the race, or None if the room does not exist.
    pub fn open_ready_phase(&mut self, code: &str, is_new_round: bool) -> Option<u64> {
        let code = normalize_code(code);
        if !self.sessions.contains_key(&code) {
            return None;
        }
        self.cancel_round_timer(&code);
        self.next_generation += 1;
        let generation = self.next_generation;
        self.ready.insert(
            code,
            ReadyPhase {
                generation,
                is_new_round,
                timer: None,
            },
        );
        Some(generation)
    }

    /// Attach the spawned timer handle to its phase. Ignored when the phase
    /// was superseded between spawn and attach.
    pub fn attach_timer(&mut self, code: &str, generation: u64, handle: JoinHandle<()>) {
        match self.ready.get_mut(&normalize_code(code)) {
            Some(phase) if phase.generation == generation => phase.timer = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Consume the room's ready phase unconditionally (quorum path). The
    /// pending timer is aborted; an already-fired timer finds the phase
    /// gone and backs off.
    pub fn claim_ready_phase(&mut self, code: &str) -> Option<ClaimedPhase> {
        let phase = self.ready.remove(&normalize_code(code))?;
        if let Some(timer) = phase.timer {
            timer.abort();
        }
        Some(ClaimedPhase {
            is_new_round: phase.is_new_round,
        })
    }

    /// Consume the ready phase only if `generation` is still current (timer
    /// path). A superseded or already-claimed phase returns None.
    pub fn claim_ready_phase_if(&mut self, code: &str, generation: u64) -> Option<ClaimedPhase> {
        let code = normalize_code(code);
        let current = self
            .ready
            .get(&code)
            .is_some_and(|phase| phase.generation == generation);
        if !current {
            return None;
        }
        let phase = self.ready.remove(&code)?;
        Some(ClaimedPhase {
            is_new_round: phase.is_new_round,
        })
    }

    /// Cancel the room's pending round timer, if any. Safe to call when no
    /// timer exists or the timer already fired.
    pub fn cancel_round_timer(&mut self, code: &str) {
        if let Some(phase) = self.ready.remove(&normalize_code(code))
            && let Some(timer) = phase.timer
        {
            timer.abort();
        }
    }

    pub fn has_pending_timer(&self, code: &str) -> bool {
        self.ready.contains_key(&normalize_code(code))
    }

    /// Abort every pending timer. Called on shutdown.
    pub fn shutdown(&mut self) {
        for (_, phase) in self.ready.drain() {
            if let Some(timer) = phase.timer {
                timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wordround_core::test_helpers::make_players;

    fn registry_with_room(code: &str, players: usize) -> SessionRegistry {
        let mut reg = SessionRegistry::new();
        reg.create_session(code).unwrap();
        for player in make_players(players) {
            assert!(reg.add_player(code, player));
        }
        reg
    }

    #[test]
    fn create_session_rejects_duplicate_codes() {
        let mut reg = SessionRegistry::new();
        reg.create_session("ABCDEF").unwrap();
        let dup = reg.create_session("abcdef");
        assert_eq!(dup, Err(RegistryError::CodeExists("ABCDEF".to_string())));
    }

    #[test]
    fn rejoin_updates_connection_and_keeps_score() {
        let mut reg = registry_with_room("ABCDEF", 2);

        // Give player1 some points, then reconnect with a new connection ref
        reg.start_session("ABCDEF", 2);
        reg.create_round("ABCDEF", 'A').unwrap();
        assert!(reg.record_answer("ABCDEF", "player1", AnswerSheet::new(), 10));

        let rejoined = Player::new("p1b", "player1", "conn-new");
        assert!(reg.add_player("ABCDEF", rejoined));

        let state = reg.state("ABCDEF").unwrap();
        assert_eq!(state.room.players.len(), 2);
        let p1 = state.room.player("player1").unwrap();
        assert_eq!(p1.connection, "conn-new");
        assert_eq!(p1.score, 10);
    }

    #[test]
    fn remove_last_player_destroys_room() {
        let mut reg = registry_with_room("ABCDEF", 1);
        let removed = reg.remove_player("ABCDEF", "conn-1").unwrap();
        assert_eq!(removed.username, "player1");
        assert!(!reg.contains("ABCDEF"));
    }

    #[test]
    fn remove_unknown_connection_is_none() {
        let mut reg = registry_with_room("ABCDEF", 2);
        assert!(reg.remove_player("ABCDEF", "conn-99").is_none());
        assert!(reg.remove_player("NOROOM", "conn-1").is_none());
    }

    #[test]
    fn start_requires_two_players() {
        let mut reg = registry_with_room("ABCDEF", 1);
        assert!(!reg.start_session("ABCDEF", 2));
        let state = reg.state("ABCDEF").unwrap();
        assert!(!state.room.is_active);
        assert_eq!(state.room.current_round, 0);
    }

    #[test]
    fn start_is_idempotent_while_active() {
        let mut reg = registry_with_room("ABCDEF", 2);
        assert!(reg.start_session("ABCDEF", 2));
        assert_eq!(reg.state("ABCDEF").unwrap().room.current_round, 1);

        reg.advance_round("ABCDEF");
        // A second start on a still-populated active room must not reset
        // the round counter
        assert!(reg.start_session("ABCDEF", 2));
        assert_eq!(reg.state("ABCDEF").unwrap().room.current_round, 2);
    }

    #[test]
    fn advance_round_clears_confirmations() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.start_session("ABCDEF", 2);
        reg.record_confirmation("ABCDEF", "player1");
        reg.record_confirmation("ABCDEF", "player2");
        assert!(reg.all_confirmed("ABCDEF"));

        assert!(reg.advance_round("ABCDEF"));
        assert_eq!(reg.state("ABCDEF").unwrap().room.current_round, 2);
        assert!(reg.list_confirmations("ABCDEF").is_empty());
        assert!(!reg.all_confirmed("ABCDEF"));
    }

    #[test]
    fn all_confirmed_counts_against_roster() {
        // Zero players: trivially confirmed (0 >= 0)
        let mut reg = SessionRegistry::new();
        reg.create_session("EMPTY0").unwrap();
        assert!(reg.all_confirmed("EMPTY0"));

        // One player
        let mut reg = registry_with_room("SOLO11", 1);
        assert!(!reg.all_confirmed("SOLO11"));
        reg.record_confirmation("SOLO11", "player1");
        assert!(reg.all_confirmed("SOLO11"));

        // N players, one missing
        let mut reg = registry_with_room("ABCDEF", 3);
        reg.record_confirmation("ABCDEF", "player1");
        reg.record_confirmation("ABCDEF", "player2");
        assert!(!reg.all_confirmed("ABCDEF"));
        reg.record_confirmation("ABCDEF", "player3");
        assert!(reg.all_confirmed("ABCDEF"));

        // Missing room
        assert!(!reg.all_confirmed("NOROOM"));
    }

    #[test]
    fn duplicate_confirmations_count_once() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.record_confirmation("ABCDEF", "player1");
        reg.record_confirmation("ABCDEF", "player1");
        assert_eq!(reg.list_confirmations("ABCDEF"), vec!["player1"]);
        assert!(!reg.all_confirmed("ABCDEF"));
    }

    #[test]
    fn create_round_tracks_current_round() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.start_session("ABCDEF", 2);
        let round = reg.create_round("ABCDEF", 'Q').unwrap();
        assert_eq!(round.round_number, 1);

        reg.advance_round("ABCDEF");
        let round = reg.create_round("ABCDEF", 'Z').unwrap();
        assert_eq!(round.round_number, 2);

        let err = reg.create_round("NOROOM", 'A');
        assert_eq!(err, Err(RegistryError::RoomNotFound("NOROOM".to_string())));
    }

    #[test]
    fn record_answer_requires_open_round_and_awards_points() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.start_session("ABCDEF", 2);

        // No round yet
        assert!(!reg.record_answer("ABCDEF", "player1", AnswerSheet::new(), 10));

        reg.create_round("ABCDEF", 'B').unwrap();
        let sheet: AnswerSheet = [("animal".to_string(), "bat".to_string())].into();
        assert!(reg.record_answer("ABCDEF", "player1", sheet.clone(), 10));
        assert_eq!(reg.get_scores("ABCDEF")["player1"], 10);

        // Resubmission overwrites the sheet and scores again
        let sheet2: AnswerSheet = [("animal".to_string(), "bee".to_string())].into();
        assert!(reg.record_answer("ABCDEF", "player1", sheet2.clone(), 10));
        let state = reg.state("ABCDEF").unwrap();
        assert_eq!(state.current_round().unwrap().answers["player1"], sheet2);
        assert_eq!(reg.get_scores("ABCDEF")["player1"], 20);
    }

    #[test]
    fn find_player_scans_all_sessions() {
        let mut reg = registry_with_room("AAAAAA", 1);
        reg.create_session("BBBBBB").unwrap();
        reg.add_player("BBBBBB", Player::new("x", "zoe", "conn-z"));

        let (code, player) = reg.find_player("zoe").unwrap();
        assert_eq!(code, "BBBBBB");
        assert_eq!(player.connection, "conn-z");
        assert!(reg.find_player("nobody").is_none());
    }

    #[test]
    fn current_round_is_strictly_increasing() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.start_session("ABCDEF", 2);
        let mut last = 0;
        for _ in 0..5 {
            let state = reg.state("ABCDEF").unwrap();
            assert!(state.room.current_round > last);
            last = state.room.current_round;
            reg.advance_round("ABCDEF");
        }
    }

    #[tokio::test]
    async fn superseding_a_phase_invalidates_old_generation() {
        let mut reg = registry_with_room("ABCDEF", 2);
        let gen1 = reg.open_ready_phase("ABCDEF", false).unwrap();
        let gen2 = reg.open_ready_phase("ABCDEF", true).unwrap();
        assert_ne!(gen1, gen2);

        assert!(reg.claim_ready_phase_if("ABCDEF", gen1).is_none());
        let claimed = reg.claim_ready_phase_if("ABCDEF", gen2).unwrap();
        assert!(claimed.is_new_round);
        // Phase consumed; nothing left to claim
        assert!(reg.claim_ready_phase("ABCDEF").is_none());
    }

    #[tokio::test]
    async fn claim_then_timer_claim_loses() {
        let mut reg = registry_with_room("ABCDEF", 2);
        let generation = reg.open_ready_phase("ABCDEF", false).unwrap();
        assert!(reg.claim_ready_phase("ABCDEF").is_some());
        assert!(reg.claim_ready_phase_if("ABCDEF", generation).is_none());
    }

    #[tokio::test]
    async fn cancel_round_timer_is_idempotent() {
        let mut reg = registry_with_room("ABCDEF", 2);
        reg.open_ready_phase("ABCDEF", false).unwrap();
        reg.cancel_round_timer("ABCDEF");
        reg.cancel_round_timer("ABCDEF");
        assert!(!reg.has_pending_timer("ABCDEF"));
    }

    #[tokio::test]
    async fn open_ready_phase_requires_room() {
        let mut reg = SessionRegistry::new();
        assert!(reg.open_ready_phase("NOROOM", false).is_none());
    }

    proptest! {
        /// No add/remove sequence may ever produce two roster entries with
        /// the same username.
        #[test]
        fn roster_never_has_duplicate_usernames(ops in prop::collection::vec((0u8..2, 0u8..4), 0..40)) {
            let mut reg = SessionRegistry::new();
            reg.create_session("ABCDEF").unwrap();
            for (op, idx) in ops {
                let username = format!("player{idx}");
                if op == 0 {
                    reg.add_player(
                        "ABCDEF",
                        Player::new(format!("id-{idx}"), username, format!("conn-{idx}")),
                    );
                } else {
                    reg.remove_player("ABCDEF", &format!("conn-{idx}"));
                }
                if let Some(state) = reg.state("ABCDEF") {
                    let mut names: Vec<_> =
                        state.room.players.iter().map(|p| &p.username).collect();
                    let total = names.len();
                    names.sort();
                    names.dedup();
                    prop_assert_eq!(names.len(), total);
                } else {
                    // Room was destroyed by the last removal; recreate so
                    // later operations still have a target
                    reg.create_session("ABCDEF").unwrap();
                }
            }
        }
    }
}
