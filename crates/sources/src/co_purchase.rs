//! Co-purchase Source - "Bought together with what you bought"
//!
//! ## Algorithm
//! 1. Walk every distinct product the user purchased
//! 2. Follow its co-purchase edges (strength = share of its buyers who also
//!    bought the target)
//! 3. Keep the strongest edge per target product
//!
//! Candidates are unvalidated: inactive or unknown products are dropped later
//! by the generator's batched product lookup.

use crate::types::{Candidate, CandidateSource, FeatureView};
use data_loader::{ProductId, StoreReader, StoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct CoPurchaseSource {
    store: Arc<dyn StoreReader>,

    /// Edges weaker than this are ignored
    min_strength: f32,
}

impl CoPurchaseSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self {
            store,
            min_strength: 0.0,
        }
    }

    /// Configure the minimum edge strength (default: 0.0)
    pub fn with_min_strength(mut self, min_strength: f32) -> Self {
        self.min_strength = min_strength;
        self
    }

    #[instrument(skip_all, fields(user_id = %view.user_id))]
    pub async fn get_candidates(
        &self,
        view: &FeatureView,
        repurchase: bool,
    ) -> StoreResult<Vec<Candidate>> {
        let mut best: BTreeMap<ProductId, Candidate> = BTreeMap::new();

        for product_id in &view.purchased {
            let edges = self.store.co_purchased_with(product_id).await?;
            for edge in edges {
                if edge.strength < self.min_strength {
                    continue;
                }
                if !repurchase && view.has_purchased(&edge.target) {
                    continue;
                }

                let mut candidate =
                    Candidate::new(edge.target.clone(), CandidateSource::CoPurchase, edge.strength);
                candidate.metadata.co_purchase_strength = Some(edge.strength);

                match best.get_mut(&edge.target) {
                    Some(existing) => existing.merge(candidate),
                    None => {
                        best.insert(edge.target, candidate);
                    }
                }
            }
        }

        debug!("Generated {} co-purchase candidates", best.len());
        Ok(best.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestCatalog, view_for};

    #[tokio::test]
    async fn test_strongest_edge_wins() {
        // u1 owns a and b; u2 bought a+c; u3 bought b+c, b+d
        let catalog = TestCatalog::new()
            .product("a", "books")
            .product("b", "books")
            .product("c", "music")
            .product("d", "music")
            .purchase("u1", "a")
            .purchase("u1", "b")
            .purchase("u2", "a")
            .purchase("u2", "c")
            .purchase("u3", "b")
            .purchase("u3", "c")
            .purchase("u3", "d");
        let store = catalog.store();
        let view = view_for(&store, "u1").await;

        let candidates = CoPurchaseSource::new(store)
            .get_candidates(&view, false)
            .await
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        // a has buyers {u1, u2}: c strength 0.5; b has buyers {u1, u3}: c 0.5, d 0.5
        assert_eq!(candidates[0].metadata.co_purchase_strength, Some(0.5));
        assert!(candidates.iter().all(|c| c.source == CandidateSource::CoPurchase));
    }

    #[tokio::test]
    async fn test_purchased_items_only_in_repurchase_mode() {
        let catalog = TestCatalog::new()
            .product("a", "books")
            .product("b", "books")
            .purchase("u1", "a")
            .purchase("u1", "b")
            .purchase("u2", "a")
            .purchase("u2", "b");
        let store = catalog.store();
        let view = view_for(&store, "u1").await;
        let source = CoPurchaseSource::new(store);

        assert!(source.get_candidates(&view, false).await.unwrap().is_empty());
        assert_eq!(source.get_candidates(&view, true).await.unwrap().len(), 2);
    }
}
