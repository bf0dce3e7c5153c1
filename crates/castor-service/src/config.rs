use castor_cache::{ConsumptionCounter, ReservationCache};
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Config collects the settings the reservation core and its replication
/// transport need at construction time. Loading it from the environment, a
/// file, or CLI flags is the transport layer's job; the core only consumes
/// the constructed struct, the way `agent::main::Args` is parsed by the
/// binary and then handed to the library as plain values.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache namespace for reservations (`reservationStore`).
    pub reservation_store_namespace: String,
    /// Cache namespace prefix for consumption buckets.
    pub consumption_store_prefix: String,
    /// Consumption bucket width, in milliseconds.
    pub telemetry_interval_millis: i64,
    /// Consumption bucket retention window.
    pub telemetry_ttl: Duration,
    /// Whether this instance is the master (selects reservations) or a
    /// slave (only replays them).
    pub master: bool,
    /// Ordered list of slave endpoints for replication.
    pub slave_uris: Vec<String>,
    /// How long a slave waits for a referenced chunk to materialize
    /// locally before failing `ChunkNotYetAvailable`.
    pub slave_wait_for_reservation_timeout: Duration,
    /// Delay between a slave's retries while waiting for a chunk.
    pub slave_retry_delay: Duration,
    /// Heartbeat interval the replication transport's server side uses to
    /// detect a dead peer. Consumed by the transport behind `Replicator`,
    /// not by the core itself.
    pub server_heartbeat: Duration,
    /// Heartbeat interval the replication transport's client side uses.
    pub client_heartbeat: Duration,
    /// Message buffer size for the replication transport's channel.
    pub message_buffer: usize,
}

impl Config {
    /// Builds the reservation cache this config describes, over an
    /// already-connected Redis handle, namespaced under
    /// `reservation_store_namespace`.
    pub fn reservation_cache(&self, conn: ConnectionManager) -> ReservationCache {
        ReservationCache::new(conn, self.reservation_store_namespace.clone())
    }

    /// Builds the consumption counter this config describes: same Redis
    /// handle, keys prefixed with `consumption_store_prefix`, bucketed by
    /// `telemetry_interval_millis` and retained for `telemetry_ttl`.
    pub fn consumption_counter(&self, conn: ConnectionManager) -> ConsumptionCounter {
        ConsumptionCounter::new(
            conn,
            self.consumption_store_prefix.clone(),
            self.telemetry_interval_millis,
            self.telemetry_ttl,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reservation_store_namespace: "reservationStore".to_string(),
            consumption_store_prefix: "consumption::".to_string(),
            telemetry_interval_millis: 60_000,
            telemetry_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            master: true,
            slave_uris: Vec::new(),
            slave_wait_for_reservation_timeout: Duration::from_secs(30),
            slave_retry_delay: Duration::from_millis(200),
            server_heartbeat: Duration::from_secs(10),
            client_heartbeat: Duration::from_secs(10),
            message_buffer: 256,
        }
    }
}
