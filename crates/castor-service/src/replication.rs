use async_trait::async_trait;
use castor_types::{Reservation, ReservationStatus, Result};

/// Replicator is the core's contract with the "inter-VCP" channel that
/// ships reservations from the master to every slave. The core owns this
/// trait, the retry policy built around it, and the request/response
/// shapes; the wire transport behind an implementation (gRPC, HTTP, a
/// message bus) is an external collaborator, same as the object store that
/// carries chunk payloads.
#[async_trait]
pub trait Replicator: Send + Sync {
    /// Ships a freshly-created, LOCKED reservation to every configured
    /// slave and waits for each to apply it locally.
    async fn replicate_apply(&self, reservation: &Reservation) -> Result<()>;

    /// Ships an activation (status transition) to every slave.
    async fn replicate_activate(&self, reservation_id: &str, status: ReservationStatus)
        -> Result<()>;
}

/// NoopReplicator is used when this instance has no slaves configured
/// (`Config::slave_uris` is empty) — a single-party deployment, or a test
/// harness exercising the master in isolation.
pub struct NoopReplicator;

#[async_trait]
impl Replicator for NoopReplicator {
    async fn replicate_apply(&self, _reservation: &Reservation) -> Result<()> {
        Ok(())
    }

    async fn replicate_activate(
        &self,
        _reservation_id: &str,
        _status: ReservationStatus,
    ) -> Result<()> {
        Ok(())
    }
}
