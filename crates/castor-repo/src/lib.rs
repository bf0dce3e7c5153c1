//! Durable, transactional storage of `Fragment` rows: the non-overlap
//! invariant, the split-on-reserve primitives, and the chunk lifecycle
//! queries the reservation and chunk-intake services are built from.

pub mod fragments;

pub use fragments::{with_tx, DEFAULT_OPERATION_TIMEOUT};
