use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use wordround_core::events::EventType;
use wordround_core::room::{RoomStatus, normalize_code};
use wordround_core::round::AnswerSheet;

use crate::error::StoreError;

/// Durable room row. Status transitions stamp `started_at`/`finished_at`
/// automatically (see [`GameStore::update_room_status`]).
#[derive(Debug, Clone, PartialEq)]
pub struct RoomRecord {
    pub id: Uuid,
    pub code: String,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub round_number: u32,
    pub letter: char,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub round_id: Uuid,
    pub username: String,
    pub answers: AnswerSheet,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

/// Durable snapshot row. The state payload is opaque JSON to the store; the
/// persistence coordinator owns its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub round_number: u32,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: Uuid,
    pub room_id: Uuid,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Contract the durable storage engine must satisfy. The engine never talks
/// to a database directly; it consumes this trait and treats every failure
/// as a [`StoreError`].
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn create_room(&self, code: &str) -> Result<RoomRecord, StoreError>;
    async fn find_room_by_code(&self, code: &str) -> Result<Option<RoomRecord>, StoreError>;
    async fn find_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError>;
    /// Update a room's status. Moving to `Playing` stamps `started_at`;
    /// moving to `Finished` stamps `finished_at`.
    async fn update_room_status(
        &self,
        id: Uuid,
        status: RoomStatus,
    ) -> Result<RoomRecord, StoreError>;
    async fn rooms_by_status(
        &self,
        statuses: &[RoomStatus],
    ) -> Result<Vec<RoomRecord>, StoreError>;

    async fn create_round(
        &self,
        room_id: Uuid,
        round_number: u32,
        letter: char,
    ) -> Result<RoundRecord, StoreError>;
    async fn find_round(
        &self,
        room_id: Uuid,
        round_number: u32,
    ) -> Result<Option<RoundRecord>, StoreError>;
    async fn create_answer(
        &self,
        round_id: Uuid,
        username: &str,
        answers: AnswerSheet,
        score: u32,
    ) -> Result<AnswerRecord, StoreError>;

    /// Append a snapshot row.
    async fn insert_snapshot(
        &self,
        room_id: Uuid,
        round_number: u32,
        state: serde_json::Value,
    ) -> Result<SnapshotRecord, StoreError>;
    /// All snapshots for a room, newest first.
    async fn snapshots(&self, room_id: Uuid) -> Result<Vec<SnapshotRecord>, StoreError>;
    async fn delete_snapshots(&self, ids: &[Uuid]) -> Result<usize, StoreError>;
    async fn snapshot_count(&self, room_id: Uuid) -> Result<usize, StoreError>;

    async fn insert_event(
        &self,
        room_id: Uuid,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<EventRecord, StoreError>;
    /// All events for a room, oldest first.
    async fn events(&self, room_id: Uuid) -> Result<Vec<EventRecord>, StoreError>;
    async fn event_count(&self, room_id: Uuid) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    rooms: HashMap<Uuid, RoomRecord>,
    codes: HashMap<String, Uuid>,
    rounds: Vec<RoundRecord>,
    answers: Vec<AnswerRecord>,
    snapshots: Vec<SnapshotRecord>,
    events: Vec<EventRecord>,
}

/// In-memory reference implementation of [`GameStore`]. Backs tests and
/// single-process deployments; insertion order doubles as creation order so
/// same-millisecond snapshots still resolve "latest" deterministically.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Lock poisoning only happens if a writer panicked; the data itself
        // is still consistent for these append-mostly maps.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn create_room(&self, code: &str) -> Result<RoomRecord, StoreError> {
        let code = normalize_code(code);
        let mut inner = self.lock();
        if inner.codes.contains_key(&code) {
            return Err(StoreError::Conflict(format!("room code {code} exists")));
        }
        let record = RoomRecord {
            id: Uuid::new_v4(),
            code: code.clone(),
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        inner.codes.insert(code, record.id);
        inner.rooms.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_room_by_code(&self, code: &str) -> Result<Option<RoomRecord>, StoreError> {
        let code = normalize_code(code);
        let inner = self.lock();
        Ok(inner
            .codes
            .get(&code)
            .and_then(|id| inner.rooms.get(id))
            .cloned())
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.lock().rooms.get(&id).cloned())
    }

    async fn update_room_status(
        &self,
        id: Uuid,
        status: RoomStatus,
    ) -> Result<RoomRecord, StoreError> {
        let mut inner = self.lock();
        let room = inner
            .rooms
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))?;
        room.status = status;
        match status {
            RoomStatus::Playing => room.started_at = Some(Utc::now()),
            RoomStatus::Finished => room.finished_at = Some(Utc::now()),
            RoomStatus::Waiting | RoomStatus::Cancelled => {},
        }
        Ok(room.clone())
    }

    async fn rooms_by_status(
        &self,
        statuses: &[RoomStatus],
    ) -> Result<Vec<RoomRecord>, StoreError> {
        Ok(self
            .lock()
            .rooms
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn create_round(
        &self,
        room_id: Uuid,
        round_number: u32,
        letter: char,
    ) -> Result<RoundRecord, StoreError> {
        let mut inner = self.lock();
        if !inner.rooms.contains_key(&room_id) {
            return Err(StoreError::NotFound(format!("room {room_id}")));
        }
        if inner
            .rounds
            .iter()
            .any(|r| r.room_id == room_id && r.round_number == round_number)
        {
            return Err(StoreError::Conflict(format!(
                "round {round_number} exists for room {room_id}"
            )));
        }
        let record = RoundRecord {
            id: Uuid::new_v4(),
            room_id,
            round_number,
            letter,
            created_at: Utc::now(),
        };
        inner.rounds.push(record.clone());
        Ok(record)
    }

    async fn find_round(
        &self,
        room_id: Uuid,
        round_number: u32,
    ) -> Result<Option<RoundRecord>, StoreError> {
        Ok(self
            .lock()
            .rounds
            .iter()
            .find(|r| r.room_id == room_id && r.round_number == round_number)
            .cloned())
    }

    async fn create_answer(
        &self,
        round_id: Uuid,
        username: &str,
        answers: AnswerSheet,
        score: u32,
    ) -> Result<AnswerRecord, StoreError> {
        let record = AnswerRecord {
            id: Uuid::new_v4(),
            round_id,
            username: username.to_string(),
            answers,
            score,
            created_at: Utc::now(),
        };
        self.lock().answers.push(record.clone());
        Ok(record)
    }

    async fn insert_snapshot(
        &self,
        room_id: Uuid,
        round_number: u32,
        state: serde_json::Value,
    ) -> Result<SnapshotRecord, StoreError> {
        let record = SnapshotRecord {
            id: Uuid::new_v4(),
            room_id,
            round_number,
            state,
            created_at: Utc::now(),
        };
        self.lock().snapshots.push(record.clone());
        Ok(record)
    }

    async fn snapshots(&self, room_id: Uuid) -> Result<Vec<SnapshotRecord>, StoreError> {
        Ok(self
            .lock()
            .snapshots
            .iter()
            .rev()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn delete_snapshots(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let before = inner.snapshots.len();
        inner.snapshots.retain(|s| !ids.contains(&s.id));
        Ok(before - inner.snapshots.len())
    }

    async fn snapshot_count(&self, room_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .lock()
            .snapshots
            .iter()
            .filter(|s| s.room_id == room_id)
            .count())
    }

    async fn insert_event(
        &self,
        room_id: Uuid,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<EventRecord, StoreError> {
        let record = EventRecord {
            id: Uuid::new_v4(),
            room_id,
            event_type,
            data,
            timestamp: Utc::now(),
        };
        self.lock().events.push(record.clone());
        Ok(record)
    }

    async fn events(&self, room_id: Uuid) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|e| e.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn event_count(&self, room_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|e| e.room_id == room_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_room_normalizes_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let room = store.create_room("abcdef").await.unwrap();
        assert_eq!(room.code, "ABCDEF");
        assert_eq!(room.status, RoomStatus::Waiting);

        let dup = store.create_room("ABCDEF").await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let found = store.find_room_by_code("aBcDeF").await.unwrap();
        assert_eq!(found.unwrap().id, room.id);
    }

    #[tokio::test]
    async fn status_transitions_stamp_timestamps() {
        let store = MemoryStore::new();
        let room = store.create_room("ABCDEF").await.unwrap();
        assert!(room.started_at.is_none());

        let playing = store
            .update_room_status(room.id, RoomStatus::Playing)
            .await
            .unwrap();
        assert!(playing.started_at.is_some());
        assert!(playing.finished_at.is_none());

        let finished = store
            .update_room_status(room.id, RoomStatus::Finished)
            .await
            .unwrap();
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn rooms_by_status_filters() {
        let store = MemoryStore::new();
        let a = store.create_room("AAAAAA").await.unwrap();
        let b = store.create_room("BBBBBB").await.unwrap();
        store
            .update_room_status(b.id, RoomStatus::Finished)
            .await
            .unwrap();

        let waiting = store.rooms_by_status(&[RoomStatus::Waiting]).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, a.id);

        let active = store
            .rooms_by_status(&[RoomStatus::Waiting, RoomStatus::Playing])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_round_number_conflicts() {
        let store = MemoryStore::new();
        let room = store.create_room("ABCDEF").await.unwrap();
        store.create_round(room.id, 1, 'A').await.unwrap();
        let dup = store.create_round(room.id, 1, 'B').await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn snapshots_return_newest_first() {
        let store = MemoryStore::new();
        let room = store.create_room("ABCDEF").await.unwrap();
        for round in 1..=3 {
            store
                .insert_snapshot(room.id, round, serde_json::json!({ "round": round }))
                .await
                .unwrap();
        }
        let snaps = store.snapshots(room.id).await.unwrap();
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0].round_number, 3);
        assert_eq!(snaps[2].round_number, 1);
    }

    #[tokio::test]
    async fn delete_snapshots_removes_only_given_ids() {
        let store = MemoryStore::new();
        let room = store.create_room("ABCDEF").await.unwrap();
        let mut ids = Vec::new();
        for round in 1..=4 {
            let snap = store
                .insert_snapshot(room.id, round, serde_json::json!({}))
                .await
                .unwrap();
            ids.push(snap.id);
        }
        let deleted = store.delete_snapshots(&ids[..2]).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.snapshot_count(room.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn events_keep_append_order() {
        let store = MemoryStore::new();
        let room = store.create_room("ABCDEF").await.unwrap();
        store
            .insert_event(room.id, EventType::PlayerJoined, serde_json::json!({"u": "a"}))
            .await
            .unwrap();
        store
            .insert_event(room.id, EventType::GameStarted, serde_json::json!({}))
            .await
            .unwrap();

        let events = store.events(room.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::PlayerJoined);
        assert_eq!(events[1].event_type, EventType::GameStarted);
        assert_eq!(store.event_count(room.id).await.unwrap(), 2);
    }
}
