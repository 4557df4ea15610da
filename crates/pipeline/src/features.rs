//! Feature lookup for candidate scoring.
//!
//! Every candidate needs its product statistics before it can be scored. The
//! lookups fan out as tokio tasks, at most `concurrency` in flight, and the
//! stage completes only once all of them have.

use data_loader::{ProductId, ProductStats, StoreError, StoreReader, StoreResult};
use sources::Candidate;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument};

/// Default number of concurrent store lookups
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Store-backed features of one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFeatures {
    pub product_id: ProductId,
    pub stats: ProductStats,
}

#[derive(Clone)]
pub struct FeatureEngineer {
    store: Arc<dyn StoreReader>,
    concurrency: usize,
}

impl FeatureEngineer {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self {
            store,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Configure the lookup concurrency (default: 8, minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch features for every candidate.
    ///
    /// The result lines up with `candidates`. The first failed lookup fails
    /// the whole stage and cancels the lookups still running.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn compute_features(
        &self,
        candidates: &[Candidate],
    ) -> StoreResult<Vec<CandidateFeatures>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (position, candidate) in candidates.iter().enumerate() {
            let store = self.store.clone();
            let semaphore = semaphore.clone();
            let product_id = candidate.product_id.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    StoreError::Unavailable {
                        operation: "product_stats",
                        reason: e.to_string(),
                    }
                })?;
                let stats = store.product_stats(&product_id).await?;
                Ok::<_, StoreError>((position, CandidateFeatures { product_id, stats }))
            });
        }

        let mut slots: Vec<Option<CandidateFeatures>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            let (position, features) = joined.map_err(|e| StoreError::Unavailable {
                operation: "product_stats",
                reason: e.to_string(),
            })??;
            slots[position] = Some(features);
        }

        let features: Vec<CandidateFeatures> = slots.into_iter().flatten().collect();
        debug!("Computed features for {} candidates", features.len());
        Ok(features)
    }
}
