//! # Sources Crate
//!
//! Profile aggregation and candidate generation for product recommendations.
//!
//! ## Components
//!
//! ### Feature View
//! `build_feature_view` gathers a user's purchases and decayed interests once
//! per request, including interests inferred from repeat purchases.
//!
//! ### Sources
//! - **Co-purchase**: "bought together with what you bought"
//! - **Similar users**: products bought by the closest shoppers (Jaccard)
//! - **Shared interest**: products in categories the user cares about
//! - **Trending**: catalog-wide trending and popularity orders, also the
//!   cold-start fallback
//!
//! ### Generator
//! `CandidateGenerator` runs the sources, merges by product, validates the
//! pool against the catalog and bounds it.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{AggregationConfig, CandidateGenerator, GenerateOptions, build_feature_view};
//!
//! let view = build_feature_view(store.as_ref(), "u1", &AggregationConfig::default()).await?;
//! let candidates = CandidateGenerator::new(store.clone())
//!     .generate(&view, &GenerateOptions::new(40))
//!     .await?;
//! ```

pub mod co_purchase;
pub mod feature_view;
pub mod generator;
pub mod shared_interest;
pub mod similar_users;
pub mod trending;
pub mod types;

#[cfg(test)]
mod test_support;

pub use co_purchase::CoPurchaseSource;
pub use feature_view::{AggregationConfig, build_feature_view};
pub use generator::{CandidateGenerator, GenerateOptions};
pub use shared_interest::SharedInterestSource;
pub use similar_users::SimilarUserSource;
pub use trending::TrendingSource;
pub use types::{
    Candidate, CandidateMetadata, CandidateSource, FeatureView, PurchaseRecord, WeightedInterest,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_creation() {
        let candidate = Candidate::new("p1", CandidateSource::CoPurchase, 0.85);
        assert_eq!(candidate.product_id, "p1");
        assert_eq!(candidate.source, CandidateSource::CoPurchase);
        assert_eq!(candidate.base_score, 0.85);
        assert!(candidate.category.is_empty());
    }

    #[test]
    fn test_source_names() {
        assert_eq!(CandidateSource::CoPurchase.as_str(), "co_purchase");
        assert_eq!(CandidateSource::Trending.as_str(), "trending");
    }
}
