//! Shared, cross-instance stores backed by Redis: the reservation cache
//! (the authoritative log of outstanding reservations) and the consumption
//! counter (rolling per-tuple-type telemetry buckets).

mod consumption_counter;
mod reservation_cache;

pub use consumption_counter::ConsumptionCounter;
pub use reservation_cache::ReservationCache;
