use std::sync::Arc;
use std::time::Instant;

use castor_cache::{ConsumptionCounter, ReservationCache};
use castor_types::{Error, Reservation, ReservationStatus, Result, TupleType};

use crate::config::Config;
use crate::fragment_store::FragmentStore;
use crate::replication::Replicator;

/// ReservationService is the request-facing API for reservation lifecycle:
/// it composes the fragment store (local split-on-reserve application), the
/// reservation cache (the cross-party authoritative log), the consumption
/// counter (telemetry), and the replication client (propagation to slaves).
#[derive(Clone)]
pub struct ReservationService {
    fragment_store: FragmentStore,
    reservation_cache: ReservationCache,
    consumption_counter: ConsumptionCounter,
    replicator: Arc<dyn Replicator>,
    config: Config,
}

impl ReservationService {
    pub fn new(
        fragment_store: FragmentStore,
        reservation_cache: ReservationCache,
        consumption_counter: ConsumptionCounter,
        replicator: Arc<dyn Replicator>,
        config: Config,
    ) -> Self {
        Self {
            fragment_store,
            reservation_cache,
            consumption_counter,
            replicator,
            config,
        }
    }

    /// Master-only entry point. Selects and applies fragments for `count`
    /// tuples of `tuple_type`, claims the reservation id in the cache,
    /// records consumption, and replicates to every configured slave.
    ///
    /// Any failure after the local split-on-reserve application rolls back
    /// by deleting the fragments it just tagged and the cache entry it just
    /// claimed, then propagates the error — mirroring the cleanup `release`
    /// performs on a reservation that was never actually wanted by the
    /// caller.
    #[tracing::instrument(level = "info", skip(self), fields(%tuple_type, count), err)]
    pub async fn create_reservation(
        &self,
        request_id: &str,
        tuple_type: TupleType,
        count: i64,
    ) -> Result<Reservation> {
        if !self.config.master {
            return Err(Error::Other(anyhow::anyhow!(
                "create_reservation called on a non-master instance"
            )));
        }

        let available = self.fragment_store.available_tuple_count(tuple_type).await?;
        if available < count {
            return Err(Error::InsufficientTuples {
                tuple_type,
                requested: count,
                available,
            });
        }

        let reservation_id = format!("{request_id}_{tuple_type}");
        let elements = self
            .fragment_store
            .select_and_apply(tuple_type, count, &reservation_id)
            .await?;
        let reservation = Reservation::new(request_id, tuple_type, elements);

        self.reservation_cache.put(&reservation).await?;

        if let Err(err) = self.finish_create(&reservation).await {
            let _ = self
                .fragment_store
                .delete_by_reservation_id(&reservation.reservation_id)
                .await;
            let _ = self.reservation_cache.delete(&reservation.reservation_id).await;
            return Err(err);
        }

        Ok(reservation)
    }

    async fn finish_create(&self, reservation: &Reservation) -> Result<()> {
        self.consumption_counter
            .record(now_millis(), reservation.tuple_type, reservation.total_reserved_tuples())
            .await?;

        self.replicator.replicate_apply(reservation).await?;
        Ok(())
    }

    /// Applies an already-built `Reservation` locally — the path a slave
    /// takes on receiving a replicated reservation, and the path a master
    /// would take to replay one after a crash recovery. Unlike
    /// `create_reservation`, no selection happens: the element list is
    /// taken as given.
    ///
    /// If the chunk a referenced element belongs to hasn't materialized
    /// locally yet (this instance is a slave that's lagging the chunk
    /// intake), retries with `config.slave_retry_delay` between attempts
    /// until `config.slave_wait_for_reservation_timeout` elapses, then fails
    /// `ChunkNotYetAvailable`.
    #[tracing::instrument(level = "info", skip(self, reservation), fields(reservation_id = %reservation.reservation_id), err)]
    pub async fn apply_reservation(&self, reservation: &Reservation) -> Result<()> {
        let deadline = Instant::now() + self.config.slave_wait_for_reservation_timeout;

        for element in &reservation.elements {
            loop {
                if self.fragment_store.is_chunk_referenced(element.chunk_id).await? {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(Error::ChunkNotYetAvailable {
                        chunk_id: element.chunk_id,
                    });
                }
                tokio::time::sleep(self.config.slave_retry_delay).await;
            }
        }

        self.fragment_store.apply_reservation(reservation).await?;
        self.consumption_counter
            .record(now_millis(), reservation.tuple_type, reservation.total_reserved_tuples())
            .await?;
        Ok(())
    }

    /// Transitions a reservation's status to UNLOCKED in the cache, then
    /// replicates the same transition to every slave. Fails
    /// `NoSuchReservation` if the id is unknown locally.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn activate(&self, reservation_id: &str) -> Result<()> {
        self.reservation_cache
            .update_status(reservation_id, ReservationStatus::Unlocked)
            .await?;
        self.replicator
            .replicate_activate(reservation_id, ReservationStatus::Unlocked)
            .await?;
        Ok(())
    }

    /// Releases every fragment tagged with `reservation_id` back to the
    /// available pool by deleting the rows outright (released capacity
    /// never returns to a prior fragment's range), then best-effort removes
    /// the cache entry.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn release(&self, reservation_id: &str) -> Result<()> {
        self.fragment_store.delete_by_reservation_id(reservation_id).await?;
        let _ = self.reservation_cache.delete(reservation_id).await;
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod test {
    // ReservationService composes FragmentStore, ReservationCache, and
    // ConsumptionCounter against real Postgres and Redis instances; it's
    // exercised end to end by crates/castor-service/tests/reservation_service.rs
    // rather than with mocks here.
}
