use castor_types::{Error, Reservation, ReservationStatus, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

/// Deadline applied to every cache round-trip below when the caller hasn't
/// set a tighter one via [`ReservationCache::with_operation_timeout`].
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// ReservationCache is the shared, cross-instance key/value store of
/// outstanding reservations: the authoritative log that lets the master
/// hand identical reservations to slaves. Keys are namespaced so that
/// multiple Castor deployments can share one cache cluster.
#[derive(Clone)]
pub struct ReservationCache {
    conn: ConnectionManager,
    namespace: String,
    operation_timeout: Duration,
}

impl ReservationCache {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Overrides the deadline applied to `put`/`get`/`update_status`/`delete`.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    fn key(&self, reservation_id: &str) -> String {
        format!("{}::{}", self.namespace, reservation_id)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Atomically claims `reservation.reservation_id`. Fails with
    /// `ReservationConflict` if the id already exists.
    #[tracing::instrument(level = "debug", skip(self, reservation), err)]
    pub async fn put(&self, reservation: &Reservation) -> Result<()> {
        self.bounded(async {
            let value = serde_json::to_string(reservation)
                .map_err(|err| Error::Other(anyhow::Error::from(err)))?;

            let claimed: bool = self
                .conn
                .clone()
                .set_nx(self.key(&reservation.reservation_id), value)
                .await?;

            if !claimed {
                return Err(Error::ReservationConflict {
                    reservation_id: reservation.reservation_id.clone(),
                });
            }
            Ok(())
        })
        .await
    }

    /// Fails with `NoSuchReservation` if the id is absent.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn update_status(
        &self,
        reservation_id: &str,
        status: ReservationStatus,
    ) -> Result<()> {
        self.bounded(async {
            let mut reservation = self.get_uncounted(reservation_id).await?.ok_or_else(|| {
                Error::NoSuchReservation {
                    reservation_id: reservation_id.to_string(),
                }
            })?;
            reservation.status = status;

            let value = serde_json::to_string(&reservation)
                .map_err(|err| Error::Other(anyhow::Error::from(err)))?;
            let _: () = self
                .conn
                .clone()
                .set(self.key(reservation_id), value)
                .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn get(&self, reservation_id: &str) -> Result<Option<Reservation>> {
        self.bounded(self.get_uncounted(reservation_id)).await
    }

    async fn get_uncounted(&self, reservation_id: &str) -> Result<Option<Reservation>> {
        let raw: Option<String> = self.conn.clone().get(self.key(reservation_id)).await?;
        match raw {
            Some(raw) => {
                let reservation = serde_json::from_str(&raw)
                    .map_err(|err| Error::Other(anyhow::Error::from(err)))?;
                Ok(Some(reservation))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn delete(&self, reservation_id: &str) -> Result<()> {
        self.bounded(async {
            let _: () = self.conn.clone().del(self.key(reservation_id)).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod test {
    // ReservationCache is exercised against a real Redis instance in
    // crates/castor-service's integration tests, where it's composed with
    // the fragment store. Its own logic (namespacing, status-merge) is thin
    // enough that unit tests would just re-assert the implementation.
}
