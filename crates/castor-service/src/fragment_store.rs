use castor_repo::fragments;
use castor_types::{
    ActivationStatus, Error, Fragment, Reservation, ReservationElement, Result, TupleType,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// FragmentStore wraps the fragment repository with the non-overlap
/// invariant, the split-on-reserve algorithm, and the chunk
/// activation/eviction lifecycle.
#[derive(Clone)]
pub struct FragmentStore {
    pool: PgPool,
    operation_timeout: Duration,
}

impl FragmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            operation_timeout: castor_repo::DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Overrides the deadline applied to every transactional operation
    /// below. Defaults to [`castor_repo::DEFAULT_OPERATION_TIMEOUT`].
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts the whole-chunk fragment a chunk intake creates at upload
    /// time. Fails with `Conflict` if a fragment for this chunk already
    /// exists and overlaps.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn keep_whole_chunk(
        &self,
        chunk_id: Uuid,
        tuple_type: TupleType,
        number_of_tuples: i64,
        status: ActivationStatus,
    ) -> Result<Fragment> {
        fragments::with_tx(&self.pool, self.operation_timeout, |txn| {
            Box::pin(async move {
                fragments::keep(txn, chunk_id, tuple_type, 0, number_of_tuples, status, None).await
            })
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn available_tuple_count(&self, tuple_type: TupleType) -> Result<i64> {
        fragments::available_tuple_count(&self.pool, tuple_type).await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn find_any_available_of_type(&self, tuple_type: TupleType) -> Result<Option<Fragment>> {
        fragments::find_any_available_of_type(&self.pool, tuple_type).await
    }

    /// Transitions every fragment of `chunk_id` from LOCKED to UNLOCKED,
    /// once every MPC party has acknowledged the chunk is ready.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn activate_all_for_chunk(&self, chunk_id: Uuid) -> Result<u64> {
        fragments::activate_all_for_chunk(&self.pool, chunk_id).await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn is_chunk_referenced(&self, chunk_id: Uuid) -> Result<bool> {
        fragments::is_chunk_referenced(&self.pool, chunk_id).await
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn has_locked_fragments(&self, chunk_id: Uuid) -> Result<bool> {
        fragments::has_locked_fragments(&self.pool, chunk_id).await
    }

    /// Runs the split-on-reserve algorithm once per element of
    /// `reservation`, all within a single transaction so that partial
    /// application is impossible: a failure on any element rolls back the
    /// splits already performed for earlier ones.
    #[tracing::instrument(level = "info", skip(self, reservation), fields(reservation_id = %reservation.reservation_id), err)]
    pub async fn apply_reservation(&self, reservation: &Reservation) -> Result<()> {
        let reservation_id = reservation.reservation_id.clone();
        let elements = reservation.elements.clone();

        fragments::with_tx(&self.pool, self.operation_timeout, move |txn| {
            Box::pin(async move {
                for element in &elements {
                    apply_element(txn, element, &reservation_id).await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Removes every fragment carrying `reservation_id`. Used on release
    /// and on rollback of a failed reservation creation.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn delete_by_reservation_id(&self, reservation_id: &str) -> Result<u64> {
        fragments::delete_by_reservation_id(&self.pool, reservation_id).await
    }

    /// Greedily walks available fragments of `tuple_type` in ascending id
    /// order, taking a prefix of each until `count` tuples are covered, and
    /// applies the split-on-reserve algorithm to each prefix as it's chosen.
    /// Selection and application run in one transaction: `available_tuple_count`'s
    /// pre-check is a best-effort estimate, but exclusivity between two
    /// concurrently created reservations is enforced here, by each prefix's
    /// split holding row locks on the fragment it's carved from until commit.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn select_and_apply(
        &self,
        tuple_type: TupleType,
        count: i64,
        reservation_id: &str,
    ) -> Result<Vec<ReservationElement>> {
        let reservation_id = reservation_id.to_string();

        fragments::with_tx(&self.pool, self.operation_timeout, move |txn| {
            Box::pin(async move {
                let mut elements = Vec::new();
                let mut remaining = count;
                let mut after_id = i64::MIN;

                while remaining > 0 {
                    let fragment = fragments::find_any_available_of_type_after(
                        &mut **txn, tuple_type, after_id,
                    )
                    .await?
                    .ok_or(Error::InsufficientTuples {
                        tuple_type,
                        requested: count,
                        available: count - remaining,
                    })?;

                    after_id = fragment.id;
                    let take = remaining.min(fragment.len());
                    let element = ReservationElement::new(fragment.chunk_id, fragment.start_index, take)
                        .map_err(Error::Other)?;

                    apply_element(txn, &element, &reservation_id).await?;
                    elements.push(element);
                    remaining -= take;
                }

                Ok(elements)
            })
        })
        .await
    }
}

/// Executes the split-on-reserve algorithm for a single `ReservationElement`:
///
/// ```text
/// need = [element.start_index, element.start_index + element.reserved_tuples)
/// cursor = need.lo
/// while cursor < need.hi:
///     f = findAvailableContainingIndex(element.chunk_id, cursor)
///     if f is None: fail UnsatisfiableReservation
///     if f.start_index < cursor:       f = splitBefore(f, cursor)
///     if need.hi < f.end_index:        f = splitAt(f, need.hi)
///     f.reservation_id = reservation_id
///     update(f)
///     cursor = f.end_index
/// ```
///
/// The first split peels off the part of the fragment preceding the
/// requested range, which remains available; the second peels off the part
/// following it, which also remains available. What's left after both
/// splits is exactly the requested sub-range.
async fn apply_element(
    txn: &mut Transaction<'_, Postgres>,
    element: &ReservationElement,
    reservation_id: &str,
) -> Result<()> {
    let need_hi = element.end_index();
    let mut cursor = element.start_index;

    while cursor < need_hi {
        let mut f = fragments::find_available_containing_index(txn, element.chunk_id, cursor)
            .await?
            .ok_or(Error::UnsatisfiableReservation {
                chunk_id: element.chunk_id,
                index: cursor,
            })?;

        if f.start_index < cursor {
            f = fragments::split_before(txn, &f, cursor).await?;
        }
        if need_hi < f.end_index {
            f = fragments::split_at(txn, &f, need_hi).await?;
        }

        f.reservation_id = Some(reservation_id.to_string());
        fragments::update(txn, &f).await?;
        cursor = f.end_index;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    // The split-on-reserve algorithm is exercised end to end, against a
    // real Postgres instance, by the scenario tests in
    // crates/castor-service/tests/reservation_service.rs. The
    // cursor-advancement logic above has no meaningful behavior to assert
    // without a fragment store behind it.
}
