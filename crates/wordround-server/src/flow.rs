use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use wordround_core::events::EventType;
use wordround_core::messages::{
    GameReadyMsg, GameStartedMsg, Notification, PlayerConfirmedMsg, RoomNotification,
    RoundFinishedMsg,
};
use wordround_core::player::Player;
use wordround_core::room::{Room, RoomStatus, generate_room_code, normalize_code};
use wordround_core::round::{AnswerSheet, Round, draw_letter};
use wordround_core::state::GameState;

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::persistence::PersistenceCoordinator;
use crate::registry::{SessionRegistry, SharedRegistry};

/// Orchestrates the whole game lifecycle: joins, the confirmation phase with
/// its timer-vs-quorum race, round play, and the durable/notification fanout
/// around each transition.
///
/// Every state mutation happens under the registry write lock, and a ready
/// phase is claimed in the same critical section that creates its round, so
/// at most one round can ever come out of one confirmation phase.
pub struct GameFlow {
    registry: SharedRegistry,
    persistence: Arc<PersistenceCoordinator>,
    notify_tx: broadcast::Sender<RoomNotification>,
    config: Arc<EngineConfig>,
    round_timer: Duration,
    snapshot_interval: Duration,
}

impl GameFlow {
    pub fn new(
        registry: SharedRegistry,
        persistence: Arc<PersistenceCoordinator>,
        notify_tx: broadcast::Sender<RoomNotification>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let round_timer = Duration::from_secs(config.game.round_timer_secs);
        let snapshot_interval = Duration::from_secs(config.persistence.snapshot_interval_secs);
        Self {
            registry,
            persistence,
            notify_tx,
            config,
            round_timer,
            snapshot_interval,
        }
    }

    /// Override the confirmation window. Lets embedding hosts (and tests)
    /// use sub-second timers.
    pub fn with_round_timer(mut self, round_timer: Duration) -> Self {
        self.round_timer = round_timer;
        self
    }

    fn emit(&self, code: &str, notification: Notification) {
        // No subscribers is fine; the transport may not be attached yet
        let _ = self.notify_tx.send(RoomNotification {
            room: normalize_code(code),
            notification,
        });
    }

    /// Create a room with a freshly generated code, live and durable.
    pub async fn create_game(&self) -> Result<Room, RegistryError> {
        let room = {
            let mut reg = self.registry.write().await;
            let mut created = None;
            for _ in 0..32 {
                let code = generate_room_code();
                if let Ok(room) = reg.create_session(&code) {
                    created = Some(room);
                    break;
                }
            }
            created.ok_or(RegistryError::CodeSpaceExhausted)?
        };
        if let Err(e) = self.persistence.store().create_room(&room.code).await {
            tracing::warn!(room = %room.code, error = %e, "durable room creation failed");
        }
        tracing::info!(room = %room.code, "room created");
        Ok(room)
    }

    /// Add a player to a room. A username already live in another room is
    /// moved out of it first; a returning username in this room reconnects
    /// in place, keeping its score.
    pub async fn join_game(
        &self,
        code: &str,
        username: &str,
        connection: &str,
    ) -> Result<Room, RegistryError> {
        let code = normalize_code(code);
        let (room, state, displaced) = {
            let mut reg = self.registry.write().await;
            if !reg.contains(&code) {
                return Err(RegistryError::RoomNotFound(code));
            }
            let displaced = match reg.find_player(username) {
                Some((other, player)) if other != code => {
                    reg.remove_player(&other, &player.connection);
                    Some((other.clone(), reg.state_cloned(&other)))
                },
                _ => None,
            };
            let player = Player::new(uuid::Uuid::new_v4().to_string(), username, connection);
            reg.add_player(&code, player);
            let state = reg
                .state(&code)
                .cloned()
                .ok_or_else(|| RegistryError::RoomNotFound(code.clone()))?;
            (state.room.clone(), state, displaced)
        };

        if let Some((other, survivors)) = displaced {
            tracing::info!(player = %username, from = %other, to = %code, "player moved rooms");
            self.after_player_left(&other, username, survivors).await;
        }

        self.emit(&code, Notification::PlayerList(room.players.clone()));
        self.persistence
            .log_event(
                &code,
                EventType::PlayerJoined,
                serde_json::json!({ "username": username }),
            )
            .await;
        if let Err(e) = self
            .persistence
            .save_milestone_snapshot(&code, &state, "player_joined")
            .await
        {
            tracing::warn!(room = %code, error = %e, "join milestone snapshot failed");
        }
        Ok(room)
    }

    /// Start the game: activate the room, auto-confirm the initiator, and
    /// open the confirmation phase with its timer.
    pub async fn start_game(self: &Arc<Self>, code: &str, username: &str) -> bool {
        let state = {
            let mut reg = self.registry.write().await;
            if !reg.start_session(code, self.config.game.min_players) {
                tracing::warn!(room = %code, "start rejected, room missing or underpopulated");
                return false;
            }
            reg.record_confirmation(code, username);
            if !self.open_ready_phase_locked(&mut reg, code, false) {
                return false;
            }
            let Some(state) = reg.state(code).cloned() else {
                return false;
            };
            state
        };

        self.emit(
            code,
            Notification::GameReadyToStart(GameReadyMsg {
                time_left: self.round_timer.as_secs(),
                total_players: state.room.players.len(),
                is_new_round: false,
            }),
        );

        if let Some(room) = self.find_durable_room(code).await
            && let Err(e) = self
                .persistence
                .store()
                .update_room_status(room.id, RoomStatus::Playing)
                .await
        {
            tracing::warn!(room = %code, error = %e, "status update failed");
        }
        self.persistence
            .log_event(
                code,
                EventType::GameStarted,
                serde_json::json!({ "started_by": username }),
            )
            .await;
        if let Err(e) = self
            .persistence
            .save_milestone_snapshot(code, &state, "game_started")
            .await
        {
            tracing::warn!(room = %code, error = %e, "start milestone snapshot failed");
        }
        self.persistence
            .start_auto_snapshot(code, self.snapshot_interval);
        tracing::info!(room = %code, by = %username, "game started, awaiting confirmations");
        true
    }

    /// Move an active room into the next round's confirmation phase.
    pub async fn start_next_round(self: &Arc<Self>, code: &str, username: &str) -> bool {
        let total_players = {
            let mut reg = self.registry.write().await;
            match reg.state(code) {
                Some(state) if state.room.is_active => {},
                _ => {
                    tracing::warn!(room = %code, "next round rejected, room not active");
                    return false;
                },
            }
            reg.advance_round(code);
            reg.record_confirmation(code, username);
            if !self.open_ready_phase_locked(&mut reg, code, true) {
                return false;
            }
            reg.state(code).map(|s| s.room.players.len()).unwrap_or(0)
        };

        self.emit(
            code,
            Notification::GameReadyToStart(GameReadyMsg {
                time_left: self.round_timer.as_secs(),
                total_players,
                is_new_round: true,
            }),
        );
        tracing::info!(room = %code, by = %username, "next round requested");
        true
    }

    /// Record a player's readiness. When the last outstanding player
    /// confirms, the ready phase resolves immediately (quorum beats timer).
    pub async fn player_ready(&self, code: &str, username: &str) -> bool {
        let (confirmed, opened) = {
            let mut reg = self.registry.write().await;
            if !reg.record_confirmation(code, username) {
                return false;
            }
            let confirmed = reg.list_confirmations(code);
            let mut opened = None;
            if reg.all_confirmed(code)
                && let Some(claimed) = reg.claim_ready_phase(code)
            {
                match reg.create_round(code, draw_letter()) {
                    Ok(round) => {
                        opened = Some((round, claimed.is_new_round, reg.state(code).cloned()));
                    },
                    Err(e) => tracing::error!(room = %code, error = %e, "round creation failed"),
                }
            }
            (confirmed, opened)
        };

        self.emit(
            code,
            Notification::PlayerConfirmed(PlayerConfirmedMsg {
                username: username.to_string(),
                confirmed_players: confirmed,
            }),
        );

        if let Some((round, is_new_round, state)) = opened {
            self.persistence
                .log_event(
                    code,
                    EventType::AllConfirmed,
                    serde_json::json!({ "round_number": round.round_number }),
                )
                .await;
            self.announce_round(code, &round, is_new_round, false, state)
                .await;
        }
        true
    }

    /// Submit an answer sheet, scoring each non-empty answer, and close the
    /// round for the whole room.
    pub async fn finish_round(&self, code: &str, username: &str, answers: AnswerSheet) -> bool {
        let points = answers.values().filter(|v| !v.trim().is_empty()).count() as u32
            * self.config.game.points_per_answer;
        let (round, scores) = {
            let mut reg = self.registry.write().await;
            if !reg.record_answer(code, username, answers.clone(), points) {
                tracing::warn!(room = %code, player = %username, "answer rejected, no open round");
                return false;
            }
            reg.close_round(code);
            let Some(round) = reg.state(code).and_then(|s| s.current_round().cloned()) else {
                return false;
            };
            (round, reg.get_scores(code))
        };

        self.emit(
            code,
            Notification::RoundFinished(RoundFinishedMsg {
                finished_by: username.to_string(),
                answers_by_player: round.answers.clone(),
                letter: round.letter,
                scores,
                round_number: round.round_number,
            }),
        );

        self.persistence
            .log_event(
                code,
                EventType::AnswerSubmitted,
                serde_json::json!({ "username": username, "score": points }),
            )
            .await;
        self.persistence
            .log_round_answer(code, round.round_number, username, answers, points)
            .await;
        self.persistence
            .log_event(
                code,
                EventType::RoundFinished,
                serde_json::json!({
                    "finished_by": username,
                    "round_number": round.round_number,
                }),
            )
            .await;
        let state = self.registry.read().await.state(code).cloned();
        if let Some(state) = state
            && let Err(e) = self
                .persistence
                .save_milestone_snapshot(code, &state, "round_finished")
                .await
        {
            tracing::warn!(room = %code, error = %e, "finish milestone snapshot failed");
        }
        tracing::info!(room = %code, by = %username, round = round.round_number, "round finished");
        true
    }

    /// Remove a dropped connection from every room it occupies. Returns the
    /// codes of affected rooms.
    pub async fn disconnect_player(&self, connection: &str) -> Vec<String> {
        let removals = {
            let mut reg = self.registry.write().await;
            let codes: Vec<String> = reg.list_sessions().iter().map(|r| r.code.clone()).collect();
            let mut removals = Vec::new();
            for code in codes {
                if let Some(player) = reg.remove_player(&code, connection) {
                    removals.push((code.clone(), player.username, reg.state_cloned(&code)));
                }
            }
            removals
        };

        let mut affected = Vec::new();
        for (code, username, survivors) in removals {
            tracing::info!(room = %code, player = %username, "player disconnected");
            self.after_player_left(&code, &username, survivors).await;
            affected.push(code);
        }
        affected
    }

    /// Shared leave handling: roster broadcast for survivors, durable
    /// teardown when the room was destroyed.
    async fn after_player_left(&self, code: &str, username: &str, survivors: Option<GameState>) {
        self.persistence
            .log_event(
                code,
                EventType::PlayerLeft,
                serde_json::json!({ "username": username }),
            )
            .await;
        match survivors {
            Some(state) => {
                self.emit(code, Notification::PlayerList(state.room.players.clone()));
                if let Err(e) = self
                    .persistence
                    .save_milestone_snapshot(code, &state, "player_left")
                    .await
                {
                    tracing::warn!(room = %code, error = %e, "leave milestone snapshot failed");
                }
            },
            None => {
                self.persistence.stop_auto_snapshot(code);
                if let Some(room) = self.find_durable_room(code).await
                    && let Err(e) = self
                        .persistence
                        .store()
                        .update_room_status(room.id, RoomStatus::Finished)
                        .await
                {
                    tracing::warn!(room = %code, error = %e, "finish status update failed");
                }
            },
        }
    }

    /// Open a ready phase and arm its expiry timer, all under the caller's
    /// write lock so the generation cannot be superseded before attach.
    fn open_ready_phase_locked(
        self: &Arc<Self>,
        reg: &mut SessionRegistry,
        code: &str,
        is_new_round: bool,
    ) -> bool {
        let Some(generation) = reg.open_ready_phase(code, is_new_round) else {
            return false;
        };
        let handle = self.spawn_round_timer(code, generation);
        reg.attach_timer(code, generation, handle);
        true
    }

    fn spawn_round_timer(self: &Arc<Self>, code: &str, generation: u64) -> JoinHandle<()> {
        let flow = Arc::clone(self);
        let code = code.to_string();
        let wait = self.round_timer;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            flow.on_timer_expired(&code, generation).await;
        })
    }

    /// Timer path of the race. The claim checks the phase generation, so a
    /// phase already resolved by quorum (or superseded) makes this a no-op.
    async fn on_timer_expired(&self, code: &str, generation: u64) {
        let opened = {
            let mut reg = self.registry.write().await;
            let Some(claimed) = reg.claim_ready_phase_if(code, generation) else {
                tracing::debug!(room = %code, "timer fired after phase resolved, backing off");
                return;
            };
            match reg.create_round(code, draw_letter()) {
                Ok(round) => Some((round, claimed.is_new_round, reg.state(code).cloned())),
                Err(e) => {
                    tracing::error!(room = %code, error = %e, "round creation failed");
                    None
                },
            }
        };

        let Some((round, is_new_round, state)) = opened else {
            return;
        };
        self.persistence
            .log_event(
                code,
                EventType::TimerExpired,
                serde_json::json!({ "round_number": round.round_number }),
            )
            .await;
        self.announce_round(code, &round, is_new_round, true, state).await;
    }

    /// Fanout after a round was created: notification, durable round row,
    /// event, milestone snapshot.
    async fn announce_round(
        &self,
        code: &str,
        round: &Round,
        is_new_round: bool,
        auto_started: bool,
        state: Option<GameState>,
    ) {
        tracing::info!(
            room = %code,
            round = round.round_number,
            letter = %round.letter,
            auto_started,
            "round started"
        );
        self.emit(
            code,
            Notification::GameStarted(GameStartedMsg {
                letter: round.letter,
                auto_started,
                round_number: round.round_number,
                is_new_round,
            }),
        );

        if let Some(room) = self.find_durable_room(code).await
            && let Err(e) = self
                .persistence
                .store()
                .create_round(room.id, round.round_number, round.letter)
                .await
        {
            tracing::warn!(room = %code, error = %e, "durable round creation failed");
        }
        self.persistence
            .log_event(
                code,
                EventType::RoundStarted,
                serde_json::json!({
                    "round_number": round.round_number,
                    "letter": round.letter,
                    "auto_started": auto_started,
                }),
            )
            .await;
        if let Some(state) = state
            && let Err(e) = self
                .persistence
                .save_milestone_snapshot(code, &state, "round_started")
                .await
        {
            tracing::warn!(room = %code, error = %e, "round milestone snapshot failed");
        }
    }

    async fn find_durable_room(&self, code: &str) -> Option<crate::store::RoomRecord> {
        match self.persistence.store().find_room_by_code(code).await {
            Ok(room) => room,
            Err(e) => {
                tracing::warn!(room = %code, error = %e, "durable room lookup failed");
                None
            },
        }
    }
}
