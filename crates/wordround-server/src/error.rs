use thiserror::Error;

/// Errors surfaced by the durable storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated (duplicate room code, player already
    /// joined). Mapped to a user-visible conflict by the caller, not retried.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The referenced durable record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend failure (I/O, connection, corrupt payload).
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors from explicitly-requested persistence operations (manual snapshot,
/// restore, cleanup). Fire-and-forget paths log instead of returning these.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("snapshot payload: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Room has no durable counterpart, so there is nothing to attach to.
    #[error("room {0} has no durable record")]
    UnknownRoom(String),
}

/// Errors from registry operations that are contract violations rather than
/// benign not-found no-ops.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("room code {0} already in use")]
    CodeExists(String),
    /// Repeated random draws kept colliding with live rooms.
    #[error("could not generate an unused room code")]
    CodeSpaceExhausted,
}
