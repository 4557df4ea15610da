//! Scoring and ranking of product candidates.
//!
//! This crate provides:
//! - FeatureEngineer: concurrent product statistics lookup per candidate
//! - Scorer: weighted linear scoring with a dominant-signal reason
//! - Filter trait, FilterPipeline and the ranking filters
//! - Ranker: ordering, dedup, diversity cap and truncation
//!
//! ## Architecture
//! 1. FeatureEngineer fetches stats for every candidate (bounded fan-out)
//! 2. Scorer turns candidate + features + feature view into a score
//! 3. Ranker filters, orders and trims the scored pool
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FeatureEngineer, Ranker, RankingOptions, Scorer, ScoringWeights};
//!
//! let features = FeatureEngineer::new(store.clone())
//!     .compute_features(&candidates)
//!     .await?;
//! let scored = Scorer::new(ScoringWeights::default())?.score_all(&candidates, &features, &view);
//! let ranked = Ranker::new().rank(scored, &view, &RankingOptions::new(10));
//! ```

pub mod features;
pub mod filter_pipeline;
pub mod filters;
pub mod ranker;
pub mod scorer;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use features::{CandidateFeatures, DEFAULT_CONCURRENCY, FeatureEngineer};
pub use filter_pipeline::FilterPipeline;
pub use ranker::{Ranker, RankingOptions, compare_ranked};
pub use scorer::{Reason, ScoredCandidate, Scorer, ScoringWeights, SubScores, WeightError};
pub use traits::Filter;
