//! Trending Source - catalog-wide popularity, no personalization
//!
//! Two orders are served. The trending order (recent sales, revenue weighted)
//! tops up a thin personalized pool. The popularity order (purchase count,
//! then recency) answers users the pipeline knows nothing about and fills
//! category-scoped requests, since it ranks products the same way the scorer
//! does when no personal signal exists.

use crate::types::{Candidate, CandidateSource, FeatureView};
use data_loader::{ProductId, StoreReader, StoreResult};
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct TrendingSource {
    store: Arc<dyn StoreReader>,
}

impl TrendingSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self { store }
    }

    /// Up to `limit` trending candidates in trending order.
    ///
    /// The store is asked for enough extra entries to cover anything the
    /// user already bought.
    #[instrument(skip_all, fields(user_id = %view.user_id, limit = limit))]
    pub async fn get_candidates(
        &self,
        view: &FeatureView,
        limit: usize,
        repurchase: bool,
    ) -> StoreResult<Vec<Candidate>> {
        let trending = self
            .store
            .trending_products(fetch_size(view, limit, repurchase))
            .await?;
        let candidates = ranked(trending, view, repurchase);

        debug!("Generated {} trending candidates", candidates.len());
        Ok(candidates)
    }

    /// Up to `limit` candidates in popularity order, optionally only from
    /// one category and its aliases.
    #[instrument(skip_all, fields(user_id = %view.user_id, limit = limit, category = ?category))]
    pub async fn get_popular_candidates(
        &self,
        view: &FeatureView,
        category: Option<&str>,
        limit: usize,
        repurchase: bool,
    ) -> StoreResult<Vec<Candidate>> {
        let popular = self
            .store
            .popular_products(category, fetch_size(view, limit, repurchase))
            .await?;
        let candidates = ranked(popular, view, repurchase);

        debug!("Generated {} popular candidates", candidates.len());
        Ok(candidates)
    }
}

fn fetch_size(view: &FeatureView, limit: usize, repurchase: bool) -> usize {
    if repurchase {
        limit
    } else {
        limit.saturating_add(view.purchased.len())
    }
}

/// Candidates for an ordered product list, scored by position
fn ranked(ordered: Vec<ProductId>, view: &FeatureView, repurchase: bool) -> Vec<Candidate> {
    let total = ordered.len();
    ordered
        .into_iter()
        .enumerate()
        .filter(|(_, product_id)| repurchase || !view.has_purchased(product_id))
        .map(|(rank, product_id)| {
            let mut candidate =
                Candidate::new(product_id, CandidateSource::Trending, rank_score(rank, total));
            candidate.metadata.trending_rank = Some(rank);
            candidate
        })
        .collect()
}

/// 1.0 for the hottest product, falling linearly with rank
pub fn rank_score(rank: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    1.0 - rank as f32 / total as f32
}
