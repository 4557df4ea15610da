//! Builders shared by unit tests.

use crate::scorer::{Reason, ScoredCandidate, SubScores};
use std::collections::BTreeSet;

pub fn scored(product_id: &str, category: &str, score: f32) -> ScoredCandidate {
    ScoredCandidate {
        product_id: product_id.to_string(),
        category: category.to_string(),
        score,
        reason: Reason::Trending,
        sub_scores: SubScores::default(),
        sources: BTreeSet::new(),
    }
}
