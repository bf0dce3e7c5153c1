use crate::TupleType;

/// Error is the closed set of failures the core surfaces to its callers.
/// Every variant is propagated unchanged; the core performs no retries of
/// its own beyond the slave's bounded wait for a not-yet-materialized chunk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `keep` would have violated the non-overlap invariant.
    #[error("fragment [{start_index}, {end_index}) overlaps an existing fragment of chunk {chunk_id}")]
    Conflict {
        chunk_id: uuid::Uuid,
        start_index: i64,
        end_index: i64,
    },

    /// No available fragment covers a required index while applying a reservation.
    #[error("no available fragment of chunk {chunk_id} covers index {index}")]
    UnsatisfiableReservation { chunk_id: uuid::Uuid, index: i64 },

    /// Fewer tuples are available than were requested, at selection time.
    #[error("insufficient tuples of type {tuple_type}: requested {requested}, available {available}")]
    InsufficientTuples {
        tuple_type: TupleType,
        requested: i64,
        available: i64,
    },

    /// The reservation cache already holds an entry for this id.
    #[error("reservation {reservation_id} already exists")]
    ReservationConflict { reservation_id: String },

    /// A reservation lookup failed where presence was required.
    #[error("no such reservation {reservation_id}")]
    NoSuchReservation { reservation_id: String },

    /// `activateAllForChunk` matched zero fragments.
    #[error("no such chunk {chunk_id}")]
    NoSuchChunk { chunk_id: uuid::Uuid },

    /// A slave timed out waiting for a chunk referenced by a replicated
    /// reservation to materialize locally.
    #[error("chunk {chunk_id} not yet available after waiting")]
    ChunkNotYetAvailable { chunk_id: uuid::Uuid },

    /// An operation's deadline expired before it could commit.
    #[error("operation timed out")]
    Timeout,

    /// The replication channel to a slave failed.
    #[error("replication transport failure: {0}")]
    TransportFailure(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("cache error")]
    Cache(#[from] redis::RedisError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
