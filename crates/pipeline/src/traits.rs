//! Core traits for the ranking stage.
//!
//! Filters run on scored candidates, after scoring and before the ranker
//! orders and trims them.

use crate::scorer::ScoredCandidate;
use sources::FeatureView;

/// Core trait for filtering scored candidates.
///
/// Filters take ownership of the Vec and return what survives, so a chain of
/// filters never clones the candidate set.
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    /// Keep the candidates this filter accepts, in their original order.
    fn apply(&self, candidates: Vec<ScoredCandidate>, view: &FeatureView) -> Vec<ScoredCandidate>;
}
