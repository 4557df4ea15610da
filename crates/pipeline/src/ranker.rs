//! Final ordering of scored candidates.
//!
//! ## Algorithm
//! 1. Run the filter pipeline (already purchased, requested category)
//! 2. Sort by score desc, ties broken by product id asc
//! 3. Drop repeated product ids, first occurrence wins
//! 4. Skip items whose category already holds `diversity_cap` results
//! 5. Stop at `limit`
//!
//! Returns fewer than `limit` items only when the pool runs out.

use crate::filter_pipeline::FilterPipeline;
use crate::filters::{AlreadyPurchasedFilter, CategoryFilter};
use crate::scorer::ScoredCandidate;
use data_loader::Category;
use sources::FeatureView;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Per-request ranking knobs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingOptions {
    pub limit: usize,
    /// Only keep products in this category (aliases included)
    pub category: Option<Category>,
    /// Allow products the user already bought
    pub repurchase: bool,
    /// Maximum results per category
    pub diversity_cap: Option<usize>,
}

impl RankingOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Self
    }

    fn pipeline_for(options: &RankingOptions) -> FilterPipeline {
        let mut pipeline = FilterPipeline::new();
        if !options.repurchase {
            pipeline = pipeline.add_filter(AlreadyPurchasedFilter);
        }
        if let Some(category) = &options.category {
            pipeline = pipeline.add_filter(CategoryFilter::new(category));
        }
        pipeline
    }

    #[instrument(skip_all, fields(user_id = %view.user_id, limit = options.limit))]
    pub fn rank(
        &self,
        scored: Vec<ScoredCandidate>,
        view: &FeatureView,
        options: &RankingOptions,
    ) -> Vec<ScoredCandidate> {
        let mut candidates = Self::pipeline_for(options).apply(scored, view);
        candidates.sort_by(compare_ranked);

        let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
        let mut per_category: HashMap<Category, usize> = HashMap::new();
        let mut ranked = Vec::with_capacity(options.limit.min(candidates.len()));

        for candidate in candidates {
            if ranked.len() >= options.limit {
                break;
            }
            if seen.contains(&candidate.product_id) {
                continue;
            }
            if let Some(cap) = options.diversity_cap {
                let used = per_category.get(&candidate.category).copied().unwrap_or(0);
                if used >= cap {
                    continue;
                }
            }

            seen.insert(candidate.product_id.clone());
            *per_category.entry(candidate.category.clone()).or_insert(0) += 1;
            ranked.push(candidate);
        }

        debug!("Ranked {} results", ranked.len());
        ranked
    }
}

/// Score desc, then product id asc
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.product_id.cmp(&b.product_id))
}
