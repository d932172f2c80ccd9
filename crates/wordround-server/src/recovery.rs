use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use wordround_core::room::RoomStatus;

use crate::config::EngineConfig;
use crate::error::PersistenceError;
use crate::persistence::PersistenceCoordinator;
use crate::registry::SharedRegistry;
use crate::store::{GameStore, RoomRecord};

/// What a recovery pass found and did. Logged once at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Rooms rebuilt into the live registry from their latest snapshot.
    pub recovered: usize,
    /// Rooms left alone: already live, or no snapshot to restore from.
    pub skipped: usize,
    /// Rooms whose restore errored (corrupt payload, backend failure).
    pub failed: usize,
    /// Active durable rooms with no snapshot or event data at all.
    pub integrity_gaps: usize,
    /// Stale finished rooms whose snapshot history was trimmed.
    pub swept: usize,
}

/// Startup reconciliation between durable storage and the empty registry.
/// Runs before any traffic is admitted: integrity check, retention sweep,
/// then restoration of every room that was waiting or playing.
pub struct RecoveryCoordinator {
    store: Arc<dyn GameStore>,
    registry: SharedRegistry,
    persistence: Arc<PersistenceCoordinator>,
    config: Arc<EngineConfig>,
}

impl RecoveryCoordinator {
    pub fn new(
        store: Arc<dyn GameStore>,
        registry: SharedRegistry,
        persistence: Arc<PersistenceCoordinator>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            persistence,
            config,
        }
    }

    /// Full recovery pass. Safe to run repeatedly: restoration never
    /// overwrites a room that is already live.
    pub async fn run(&self) -> Result<RecoveryReport, PersistenceError> {
        let mut report = RecoveryReport::default();
        self.verify_integrity(&mut report).await?;
        self.sweep_finished(&mut report).await?;
        self.recover_active(&mut report).await?;
        tracing::info!(
            recovered = report.recovered,
            skipped = report.skipped,
            failed = report.failed,
            integrity_gaps = report.integrity_gaps,
            swept = report.swept,
            "recovery pass complete"
        );
        Ok(report)
    }

    async fn active_rooms(&self) -> Result<Vec<RoomRecord>, PersistenceError> {
        Ok(self
            .store
            .rooms_by_status(&[RoomStatus::Waiting, RoomStatus::Playing])
            .await?)
    }

    /// Flag active durable rooms that have neither snapshots nor events.
    /// They cannot be restored and point at a persistence outage during the
    /// previous run.
    async fn verify_integrity(&self, report: &mut RecoveryReport) -> Result<(), PersistenceError> {
        for room in self.active_rooms().await? {
            if !self.persistence.has_persistence_data(&room.code).await {
                tracing::warn!(room = %room.code, status = ?room.status, "active room has no persistence data");
                report.integrity_gaps += 1;
            }
        }
        Ok(())
    }

    /// Trim snapshot history for rooms finished longer ago than the
    /// retention window, keeping only the configured tail.
    async fn sweep_finished(&self, report: &mut RecoveryReport) -> Result<(), PersistenceError> {
        let retention = ChronoDuration::hours(self.config.recovery.finished_retention_hours as i64);
        let cutoff = Utc::now() - retention;
        let finished = self.store.rooms_by_status(&[RoomStatus::Finished]).await?;
        for room in finished {
            let Some(finished_at) = room.finished_at else {
                continue;
            };
            if finished_at >= cutoff {
                continue;
            }
            match self
                .persistence
                .cleanup_old_snapshots(&room.code, self.config.recovery.finished_keep_count)
                .await
            {
                Ok(0) => {},
                Ok(deleted) => {
                    tracing::info!(room = %room.code, deleted, "swept stale finished room");
                    report.swept += 1;
                },
                Err(e) => {
                    tracing::warn!(room = %room.code, error = %e, "sweep failed");
                    report.failed += 1;
                },
            }
        }
        Ok(())
    }

    /// Rebuild live sessions for every waiting or playing room from its
    /// latest snapshot, and re-arm auto-snapshotting for active ones.
    async fn recover_active(&self, report: &mut RecoveryReport) -> Result<(), PersistenceError> {
        let interval = Duration::from_secs(self.config.persistence.snapshot_interval_secs);
        for room in self.active_rooms().await? {
            let state = match self.persistence.restore_state(&room.code).await {
                Ok(Some(state)) => state,
                Ok(None) => {
                    tracing::debug!(room = %room.code, "no snapshot, nothing to restore");
                    report.skipped += 1;
                    continue;
                },
                Err(e) => {
                    tracing::error!(room = %room.code, error = %e, "restore failed");
                    report.failed += 1;
                    continue;
                },
            };
            let is_active = state.room.is_active;
            let inserted = {
                let mut reg = self.registry.write().await;
                reg.insert_recovered(state)
            };
            if !inserted {
                tracing::debug!(room = %room.code, "room already live, snapshot discarded");
                report.skipped += 1;
                continue;
            }
            tracing::info!(room = %room.code, is_active, "room restored from snapshot");
            report.recovered += 1;
            // Confirmation phases and their timers are not snapshotted; a
            // restored active room waits for the next start_next_round
            if is_active {
                self.persistence.start_auto_snapshot(&room.code, interval);
            }
        }
        Ok(())
    }
}
