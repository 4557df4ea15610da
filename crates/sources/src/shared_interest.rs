//! Shared-interest Source - products in categories the user cares about
//!
//! Each interest maps onto its own category plus any aliased product
//! category (technology -> electronics, fashion -> clothing, ...). Every
//! product found there is a candidate scored by the interest's decayed
//! confidence.

use crate::types::{Candidate, CandidateSource, FeatureView};
use data_loader::{ProductId, StoreReader, StoreResult, equivalent_categories};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct SharedInterestSource {
    store: Arc<dyn StoreReader>,

    /// Interests weaker than this after decay are ignored
    min_weight: f32,
}

impl SharedInterestSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self {
            store,
            min_weight: 0.0,
        }
    }

    /// Configure the minimum decayed confidence (default: 0.0)
    pub fn with_min_weight(mut self, min_weight: f32) -> Self {
        self.min_weight = min_weight;
        self
    }

    #[instrument(skip_all, fields(user_id = %view.user_id))]
    pub async fn get_candidates(
        &self,
        view: &FeatureView,
        repurchase: bool,
    ) -> StoreResult<Vec<Candidate>> {
        let mut best: BTreeMap<ProductId, Candidate> = BTreeMap::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();

        // Interests are sorted strongest first, so the first visit of a
        // category carries its best weight.
        for interest in &view.interests {
            if interest.weighted_confidence <= 0.0 || interest.weighted_confidence < self.min_weight {
                continue;
            }

            for category in equivalent_categories(&interest.category) {
                if !visited.insert(category.clone()) {
                    continue;
                }

                let products = self.store.products_in_category(&category).await?;
                for product_id in products {
                    if !repurchase && view.has_purchased(&product_id) {
                        continue;
                    }

                    let mut candidate = Candidate::new(
                        product_id.clone(),
                        CandidateSource::SharedInterest,
                        interest.weighted_confidence,
                    )
                    .with_category(category.clone());
                    candidate.metadata.interest_weight = Some(interest.weighted_confidence);
                    candidate.metadata.matched_interest = Some(interest.value.clone());

                    match best.get_mut(&product_id) {
                        Some(existing) => existing.merge(candidate),
                        None => {
                            best.insert(product_id, candidate);
                        }
                    }
                }
            }
        }

        debug!("Generated {} shared-interest candidates", best.len());
        Ok(best.into_values().collect())
    }
}
