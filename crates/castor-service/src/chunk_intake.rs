use castor_types::{ActivationStatus, Result, TupleChunk};
use uuid::Uuid;

use crate::fragment_store::FragmentStore;

/// ChunkIntake is the boundary the chunk-transfer protocol calls through:
/// accepting a newly uploaded chunk (`keep`), acknowledging cross-party
/// agreement on it (`activate`), and reclaiming storage for chunks no
/// fragment of which can ever be reserved again (`evict_once`).
#[derive(Clone)]
pub struct ChunkIntake {
    fragment_store: FragmentStore,
}

impl ChunkIntake {
    pub fn new(fragment_store: FragmentStore) -> Self {
        Self { fragment_store }
    }

    /// Registers a newly received chunk as one LOCKED fragment spanning its
    /// whole range. Fails with `Conflict` if this chunk id was already kept.
    #[tracing::instrument(level = "info", skip(self), fields(chunk_id = %chunk.chunk_id), err)]
    pub async fn keep(&self, chunk: TupleChunk) -> Result<()> {
        self.fragment_store
            .keep_whole_chunk(
                chunk.chunk_id,
                chunk.tuple_type,
                chunk.number_of_tuples,
                ActivationStatus::Locked,
            )
            .await?;
        Ok(())
    }

    /// Called once every MPC party has acknowledged the chunk transferred
    /// successfully: flips every LOCKED fragment of the chunk to UNLOCKED,
    /// making it reservable.
    #[tracing::instrument(level = "info", skip(self), err)]
    pub async fn activate(&self, chunk_id: Uuid) -> Result<()> {
        self.fragment_store.activate_all_for_chunk(chunk_id).await?;
        Ok(())
    }

    /// Scans `chunk_ids` and reports which of them have no referenced
    /// fragments (every fragment ever kept for the chunk has since been
    /// reserved and released, leaving nothing behind) and no LOCKED
    /// fragments pending activation — i.e. a chunk that can never again
    /// contribute a reservable tuple, whose object-store payload is safe to
    /// delete. Returns the ids actually evicted. The caller supplies the
    /// candidate id list; discovering which chunks to consider is specific
    /// to whatever storage system holds the chunk payloads and out of scope
    /// here.
    #[tracing::instrument(level = "info", skip(self, chunk_ids), err)]
    pub async fn evict_once(&self, chunk_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut evicted = Vec::new();
        for &chunk_id in chunk_ids {
            if self.fragment_store.has_locked_fragments(chunk_id).await? {
                continue;
            }
            if self.fragment_store.is_chunk_referenced(chunk_id).await? {
                continue;
            }
            // `is_chunk_referenced` being false already implies no LOCKED
            // fragments remain; the first check stays explicit rather than
            // relying on that implication.
            evicted.push(chunk_id);
        }
        Ok(evicted)
    }

    /// Runs `evict_once` against `candidates()` on a fixed interval until
    /// `exit` resolves, in the polling-loop shape the rest of this codebase
    /// uses for background maintenance work.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run_eviction_loop<C, F, E>(
        &self,
        mut candidates: C,
        interval: std::time::Duration,
        exit: E,
    ) -> anyhow::Result<()>
    where
        C: FnMut() -> F,
        F: std::future::Future<Output = anyhow::Result<Vec<Uuid>>>,
        E: std::future::Future<Output = ()> + Send,
    {
        use futures::FutureExt;

        tokio::pin!(exit);
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            if (&mut exit).now_or_never().is_some() {
                tracing::info!("eviction loop caught exit signal");
                return Ok(());
            }

            let ids = candidates().await?;
            match self.evict_once(&ids).await {
                Ok(evicted) if !evicted.is_empty() => {
                    tracing::info!(count = evicted.len(), "evicted exhausted chunks");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "eviction pass failed"),
            }
        }
    }
}

#[cfg(test)]
mod test {
    // Eviction is exercised against a real Postgres instance in
    // crates/castor-service/tests/chunk_intake.rs; the loop driver above has
    // no logic worth asserting without a live store and clock behind it.
}
