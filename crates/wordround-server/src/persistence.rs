use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use wordround_core::events::{EventType, GameEvent};
use wordround_core::round::AnswerSheet;
use wordround_core::snapshot::Snapshot;
use wordround_core::state::GameState;

use crate::config::PersistenceConfig;
use crate::error::PersistenceError;
use crate::registry::SharedRegistry;
use crate::store::{GameStore, RoomRecord, SnapshotRecord};

/// Admin-facing summary of a room's durable footprint.
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceInfo {
    pub has_data: bool,
    pub snapshot_count: usize,
    pub event_count: usize,
    pub recent_events: Vec<GameEvent>,
}

/// Writes domain events and state snapshots through the durable storage
/// contract. Milestone and event-log writes are best-effort: a failure is
/// logged and the in-memory state is never rolled back. Explicitly
/// requested operations (manual snapshot, restore, cleanup) propagate
/// errors so the admin caller can report them.
pub struct PersistenceCoordinator {
    store: Arc<dyn GameStore>,
    registry: SharedRegistry,
    auto_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Rolling history bound applied after every snapshot write.
    snapshot_keep_count: usize,
    /// How many recent events the admin info surface returns.
    recent_event_limit: usize,
}

impl PersistenceCoordinator {
    pub fn new(
        store: Arc<dyn GameStore>,
        registry: SharedRegistry,
        config: &PersistenceConfig,
    ) -> Self {
        Self {
            store,
            registry,
            auto_tasks: Mutex::new(HashMap::new()),
            snapshot_keep_count: config.snapshot_keep_count,
            recent_event_limit: config.recent_event_limit,
        }
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.auto_tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn resolve_room(&self, code: &str) -> Result<Option<RoomRecord>, PersistenceError> {
        Ok(self.store.find_room_by_code(code).await?)
    }

    /// Best-effort event append. A room without a durable counterpart, or a
    /// failing write, is logged and swallowed.
    pub async fn log_event(&self, code: &str, event_type: EventType, data: serde_json::Value) {
        let room = match self.resolve_room(code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                tracing::warn!(room = %code, ?event_type, "no durable room, dropping event");
                return;
            },
            Err(e) => {
                tracing::warn!(room = %code, error = %e, "event lookup failed, dropping event");
                return;
            },
        };
        if let Err(e) = self.store.insert_event(room.id, event_type, data).await {
            tracing::warn!(room = %code, ?event_type, error = %e, "failed to append event");
        }
    }

    /// Serialize the full aggregate (timer-free by construction) and persist
    /// it as a new immutable snapshot record. History beyond the configured
    /// keep count is pruned right after the write, best-effort.
    pub async fn save_snapshot(
        &self,
        code: &str,
        state: &GameState,
    ) -> Result<SnapshotRecord, PersistenceError> {
        let room = self
            .resolve_room(code)
            .await?
            .ok_or_else(|| PersistenceError::UnknownRoom(code.to_string()))?;
        let payload = serde_json::to_value(state)?;
        let record = self
            .store
            .insert_snapshot(room.id, state.room.current_round, payload)
            .await?;
        tracing::debug!(room = %code, round = state.room.current_round, "snapshot saved");
        match self.prune_snapshots(room.id, self.snapshot_keep_count).await {
            Ok(0) => {},
            Ok(pruned) => tracing::debug!(room = %code, pruned, "snapshot history trimmed"),
            Err(e) => tracing::warn!(room = %code, error = %e, "snapshot prune failed"),
        }
        Ok(record)
    }

    /// Snapshot plus a tagged `milestone.snapshot` event. Called at the
    /// significant transitions: player joined/left, game started, round
    /// started/finished.
    pub async fn save_milestone_snapshot(
        &self,
        code: &str,
        state: &GameState,
        milestone: &str,
    ) -> Result<SnapshotRecord, PersistenceError> {
        let record = self.save_snapshot(code, state).await?;
        self.log_event(
            code,
            EventType::MilestoneSnapshot,
            serde_json::json!({ "milestone": milestone }),
        )
        .await;
        Ok(record)
    }

    /// Most recent snapshot for the room by creation time, deserialized.
    pub async fn latest_snapshot(&self, code: &str) -> Result<Option<Snapshot>, PersistenceError> {
        let Some(room) = self.resolve_room(code).await? else {
            tracing::warn!(room = %code, "no durable room, no snapshot to load");
            return Ok(None);
        };
        let Some(record) = self.store.snapshots(room.id).await?.into_iter().next() else {
            return Ok(None);
        };
        let state: GameState = serde_json::from_value(record.state)?;
        Ok(Some(Snapshot {
            id: record.id,
            room_code: code.to_string(),
            round_number: record.round_number,
            created_at: record.created_at,
            state,
        }))
    }

    /// Rehydrate a timer-free game state from the latest snapshot.
    pub async fn restore_state(&self, code: &str) -> Result<Option<GameState>, PersistenceError> {
        Ok(self.latest_snapshot(code).await?.map(|s| s.state))
    }

    /// Start periodic background snapshotting for a room, replacing any
    /// existing schedule. The task stops itself once the room leaves the
    /// registry.
    pub fn start_auto_snapshot(self: &Arc<Self>, code: &str, interval: Duration) {
        self.stop_auto_snapshot(code);
        let coordinator = Arc::clone(self);
        let registry = Arc::clone(&self.registry);
        let code_owned = code.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a milestone
            // snapshot at schedule time is not duplicated
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let state = {
                    let reg = registry.read().await;
                    reg.state(&code_owned).cloned()
                };
                let Some(state) = state else {
                    tracing::debug!(room = %code_owned, "room gone, stopping auto-snapshot");
                    coordinator.tasks().remove(&code_owned);
                    break;
                };
                if let Err(e) = coordinator.save_snapshot(&code_owned, &state).await {
                    tracing::warn!(room = %code_owned, error = %e, "auto-snapshot failed");
                }
            }
        });
        if let Some(old) = self.tasks().insert(code.to_string(), handle) {
            old.abort();
        }
    }

    /// Stop periodic snapshotting for a room. Idempotent.
    pub fn stop_auto_snapshot(&self, code: &str) {
        if let Some(handle) = self.tasks().remove(code) {
            handle.abort();
        }
    }

    pub fn auto_snapshot_active(&self, code: &str) -> bool {
        self.tasks().contains_key(code)
    }

    /// Delete all but the most recent `keep` snapshots, oldest first.
    /// Returns the number deleted.
    pub async fn cleanup_old_snapshots(
        &self,
        code: &str,
        keep: usize,
    ) -> Result<usize, PersistenceError> {
        let room = self
            .resolve_room(code)
            .await?
            .ok_or_else(|| PersistenceError::UnknownRoom(code.to_string()))?;
        let deleted = self.prune_snapshots(room.id, keep).await?;
        if deleted > 0 {
            tracing::info!(room = %code, deleted, keep, "pruned old snapshots");
        }
        Ok(deleted)
    }

    async fn prune_snapshots(&self, room_id: Uuid, keep: usize) -> Result<usize, PersistenceError> {
        let snapshots = self.store.snapshots(room_id).await?;
        if snapshots.len() <= keep {
            return Ok(0);
        }
        let stale: Vec<_> = snapshots.iter().skip(keep).map(|s| s.id).collect();
        Ok(self.store.delete_snapshots(&stale).await?)
    }

    /// True iff at least one snapshot or event exists for the room. Errors
    /// degrade to false.
    pub async fn has_persistence_data(&self, code: &str) -> bool {
        let Ok(Some(room)) = self.resolve_room(code).await else {
            return false;
        };
        let snapshots = self.store.snapshot_count(room.id).await.unwrap_or(0);
        let events = self.store.event_count(room.id).await.unwrap_or(0);
        snapshots > 0 || events > 0
    }

    /// Admin info surface: data flag, counts, and the configured number of
    /// most recent events.
    pub async fn persistence_info(&self, code: &str) -> Result<PersistenceInfo, PersistenceError> {
        let room = self
            .resolve_room(code)
            .await?
            .ok_or_else(|| PersistenceError::UnknownRoom(code.to_string()))?;
        let snapshot_count = self.store.snapshot_count(room.id).await?;
        let events = self.store.events(room.id).await?;
        let event_count = events.len();
        let recent_events = events
            .into_iter()
            .rev()
            .take(self.recent_event_limit)
            .map(|e| GameEvent {
                event_type: e.event_type,
                data: e.data,
                timestamp: e.timestamp,
            })
            .collect();
        Ok(PersistenceInfo {
            has_data: snapshot_count > 0 || event_count > 0,
            snapshot_count,
            event_count,
            recent_events,
        })
    }

    /// Best-effort durable record of a submitted answer sheet against the
    /// room's round row.
    pub async fn log_round_answer(
        &self,
        code: &str,
        round_number: u32,
        username: &str,
        answers: AnswerSheet,
        score: u32,
    ) {
        let room = match self.resolve_room(code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                tracing::warn!(room = %code, "no durable room, dropping answer record");
                return;
            },
            Err(e) => {
                tracing::warn!(room = %code, error = %e, "answer lookup failed");
                return;
            },
        };
        let round = match self.store.find_round(room.id, round_number).await {
            Ok(Some(round)) => round,
            Ok(None) => {
                tracing::warn!(room = %code, round = round_number, "no durable round for answer");
                return;
            },
            Err(e) => {
                tracing::warn!(room = %code, error = %e, "round lookup failed");
                return;
            },
        };
        if let Err(e) = self
            .store
            .create_answer(round.id, username, answers, score)
            .await
        {
            tracing::warn!(room = %code, player = %username, error = %e, "failed to record answer");
        }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Abort all auto-snapshot tasks. Called on shutdown.
    pub fn shutdown(&self) {
        for (_, handle) in self.tasks().drain() {
            handle.abort();
        }
    }
}
