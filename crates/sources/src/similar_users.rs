//! Similar-user Source - "Shoppers like you also bought"
//!
//! ## Algorithm
//! 1. Ask the store for the top-K users by Jaccard overlap of purchase sets
//! 2. Every product those users bought becomes a candidate
//! 3. A candidate's strength is the similarity of the closest user who bought it

use crate::types::{Candidate, CandidateSource, FeatureView};
use data_loader::{ProductId, StoreReader, StoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct SimilarUserSource {
    store: Arc<dyn StoreReader>,

    /// How many neighbours to consult
    neighbours: usize,
}

impl SimilarUserSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self {
            store,
            neighbours: 5,
        }
    }

    /// Configure how many similar users to consult (default: 5)
    pub fn with_neighbours(mut self, neighbours: usize) -> Self {
        self.neighbours = neighbours;
        self
    }

    #[instrument(skip_all, fields(user_id = %view.user_id))]
    pub async fn get_candidates(
        &self,
        view: &FeatureView,
        repurchase: bool,
    ) -> StoreResult<Vec<Candidate>> {
        if view.purchased.is_empty() || self.neighbours == 0 {
            return Ok(Vec::new());
        }

        let neighbours = self
            .store
            .similar_users(&view.user_id, self.neighbours)
            .await?;
        debug!("Found {} similar users", neighbours.len());

        let mut best: BTreeMap<ProductId, Candidate> = BTreeMap::new();
        for neighbour in &neighbours {
            let products = self.store.purchased_products(&neighbour.target).await?;
            for product_id in products {
                if !repurchase && view.has_purchased(&product_id) {
                    continue;
                }

                let mut candidate = Candidate::new(
                    product_id.clone(),
                    CandidateSource::SimilarUser,
                    neighbour.strength,
                );
                candidate.metadata.similar_user_strength = Some(neighbour.strength);

                match best.get_mut(&product_id) {
                    Some(existing) => existing.merge(candidate),
                    None => {
                        best.insert(product_id, candidate);
                    }
                }
            }
        }

        debug!("Generated {} similar-user candidates", best.len());
        Ok(best.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestCatalog, view_for};

    #[tokio::test]
    async fn test_closest_neighbour_sets_strength() {
        // u2 shares both of u1's products, u3 shares one
        let store = TestCatalog::new()
            .product("a", "books")
            .product("b", "books")
            .product("c", "music")
            .product("d", "toys")
            .purchase("u1", "a")
            .purchase("u1", "b")
            .purchase("u2", "a")
            .purchase("u2", "b")
            .purchase("u2", "c")
            .purchase("u3", "a")
            .purchase("u3", "c")
            .purchase("u3", "d")
            .store();
        let view = view_for(&store, "u1").await;

        let candidates = SimilarUserSource::new(store)
            .get_candidates(&view, false)
            .await
            .unwrap();

        let c = candidates.iter().find(|c| c.product_id == "c").unwrap();
        let d = candidates.iter().find(|c| c.product_id == "d").unwrap();
        // u2: |{a,b}| / |{a,b,c}| = 2/3, u3: |{a}| / |{a,b,c,d}| = 1/4
        assert!((c.metadata.similar_user_strength.unwrap() - 2.0 / 3.0).abs() < 1e-6);
        assert!((d.metadata.similar_user_strength.unwrap() - 0.25).abs() < 1e-6);
        assert!(candidates.iter().all(|c| !view.has_purchased(&c.product_id)));
    }

    #[tokio::test]
    async fn test_no_purchases_no_candidates() {
        let store = TestCatalog::new()
            .product("a", "books")
            .user("u1")
            .purchase("u2", "a")
            .store();
        let view = view_for(&store, "u1").await;

        let candidates = SimilarUserSource::new(store)
            .get_candidates(&view, false)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
