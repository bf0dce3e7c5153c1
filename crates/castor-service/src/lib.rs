//! The request-facing core: chunk intake, reservation creation/application,
//! and the replication seam that keeps a master and its slaves consistent.

mod chunk_intake;
mod config;
mod fragment_store;
mod replication;
mod reservation_service;

pub use chunk_intake::ChunkIntake;
pub use config::Config;
pub use fragment_store::FragmentStore;
pub use replication::{NoopReplicator, Replicator};
pub use reservation_service::ReservationService;
