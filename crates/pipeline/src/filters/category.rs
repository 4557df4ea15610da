//! Filter to restrict results to one category.
//!
//! The requested category matches product categories directly or through
//! the interest alias table, so "technology" keeps electronics.

use crate::scorer::ScoredCandidate;
use crate::traits::Filter;
use data_loader::{Category, category_matches, normalize_category};
use sources::FeatureView;

pub struct CategoryFilter {
    category: Category,
}

impl CategoryFilter {
    pub fn new(category: &str) -> Self {
        Self {
            category: normalize_category(category),
        }
    }
}

impl Filter for CategoryFilter {
    fn name(&self) -> &str {
        "CategoryFilter"
    }

    fn apply(&self, candidates: Vec<ScoredCandidate>, _view: &FeatureView) -> Vec<ScoredCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| category_matches(&self.category, &candidate.category))
            .collect()
    }
}
