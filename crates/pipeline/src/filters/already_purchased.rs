//! Filter to remove products the user has already bought.
//!
//! Left out of the pipeline when the request asks for repurchases.

use crate::scorer::ScoredCandidate;
use crate::traits::Filter;
use sources::FeatureView;

/// Removes candidates found in the user's purchased set.
pub struct AlreadyPurchasedFilter;

impl Filter for AlreadyPurchasedFilter {
    fn name(&self) -> &str {
        "AlreadyPurchasedFilter"
    }

    fn apply(&self, candidates: Vec<ScoredCandidate>, view: &FeatureView) -> Vec<ScoredCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| !view.has_purchased(&candidate.product_id))
            .collect()
    }
}
