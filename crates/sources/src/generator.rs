//! Candidate Generator - merges every source into one bounded pool.
//!
//! ## Algorithm
//! 1. Run the personalized sources (co-purchase, similar-user,
//!    shared-interest) concurrently, plus a fallback list
//! 2. Merge by product id: provenance is unioned, each signal keeps its max
//! 3. Validate the whole pool with one batched product lookup, dropping
//!    unknown and inactive products and, for category requests, products
//!    outside the category
//! 4. With a per-category quota, keep only the best candidates of each
//!    category so the cut below leaves room for other categories
//! 5. Top up from the fallback list when the pool is smaller than the bound
//! 6. Order by (base score desc, product id asc) and truncate to the bound
//!
//! The fallback list is the trending order for open requests and the
//! popularity order for category requests and for users with no purchases
//! and no interests.

use crate::co_purchase::CoPurchaseSource;
use crate::shared_interest::SharedInterestSource;
use crate::similar_users::SimilarUserSource;
use crate::trending::TrendingSource;
use crate::types::{Candidate, CandidateSource, FeatureView};
use data_loader::{Category, Product, ProductId, StoreReader, StoreResult, category_matches};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What one generation pass should produce
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Maximum pool size
    pub bound: usize,
    /// Allow products the user already bought
    pub repurchase: bool,
    /// Only products of this category or its aliases
    pub category: Option<Category>,
    /// At most this many candidates per product category
    pub per_category: Option<usize>,
}

impl GenerateOptions {
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            ..Self::default()
        }
    }

    pub fn with_repurchase(mut self, repurchase: bool) -> Self {
        self.repurchase = repurchase;
        self
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    pub fn with_per_category(mut self, per_category: Option<usize>) -> Self {
        self.per_category = per_category;
        self
    }

    /// How deep the fallback list is read. A quota can reject any number of
    /// entries, so quota requests read the whole list.
    fn fallback_depth(&self) -> usize {
        if self.per_category.is_some() {
            usize::MAX
        } else {
            self.bound
        }
    }
}

pub struct CandidateGenerator {
    store: Arc<dyn StoreReader>,
    co_purchase: CoPurchaseSource,
    similar_users: SimilarUserSource,
    shared_interest: SharedInterestSource,
    trending: TrendingSource,
}

impl CandidateGenerator {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self {
            co_purchase: CoPurchaseSource::new(store.clone()),
            similar_users: SimilarUserSource::new(store.clone()),
            shared_interest: SharedInterestSource::new(store.clone()),
            trending: TrendingSource::new(store.clone()),
            store,
        }
    }

    /// Configure how many similar users feed the pool (default: 5)
    pub fn with_similar_users(mut self, neighbours: usize) -> Self {
        self.similar_users = SimilarUserSource::new(self.store.clone()).with_neighbours(neighbours);
        self
    }

    /// Ignore co-purchase edges weaker than this (default: 0.0)
    pub fn with_min_co_purchase_strength(mut self, min_strength: f32) -> Self {
        self.co_purchase = CoPurchaseSource::new(self.store.clone()).with_min_strength(min_strength);
        self
    }

    /// Ignore interests whose decayed confidence is below this (default: 0.0)
    pub fn with_min_interest_weight(mut self, min_weight: f32) -> Self {
        self.shared_interest =
            SharedInterestSource::new(self.store.clone()).with_min_weight(min_weight);
        self
    }

    /// Generate at most `options.bound` validated candidates for the user in `view`.
    #[instrument(
        skip_all,
        fields(user_id = %view.user_id, bound = options.bound, category = ?options.category)
    )]
    pub async fn generate(
        &self,
        view: &FeatureView,
        options: &GenerateOptions,
    ) -> StoreResult<Vec<Candidate>> {
        let bound = options.bound;
        if bound == 0 {
            return Ok(Vec::new());
        }
        let category = options.category.as_deref();
        let repurchase = options.repurchase;
        let depth = options.fallback_depth();

        let mut pool: BTreeMap<ProductId, Candidate> = BTreeMap::new();

        let fallback = if view.is_empty() {
            warn!(
                "Insufficient data for user {}, falling back to popular products",
                view.user_id
            );
            self.trending
                .get_popular_candidates(view, category, depth, repurchase)
                .await?
        } else {
            let fallback = async {
                match category {
                    Some(_) => {
                        self.trending
                            .get_popular_candidates(view, category, depth, repurchase)
                            .await
                    }
                    None => self.trending.get_candidates(view, depth, repurchase).await,
                }
            };
            let (co_purchase, similar, interest, fallback) = tokio::try_join!(
                self.co_purchase.get_candidates(view, repurchase),
                self.similar_users.get_candidates(view, repurchase),
                self.shared_interest.get_candidates(view, repurchase),
                fallback,
            )?;
            debug!(
                "Source sizes: co_purchase={}, similar_user={}, shared_interest={}, fallback={}",
                co_purchase.len(),
                similar.len(),
                interest.len(),
                fallback.len()
            );

            for candidate in co_purchase.into_iter().chain(similar).chain(interest) {
                match pool.get_mut(&candidate.product_id) {
                    Some(existing) => existing.merge(candidate),
                    None => {
                        pool.insert(candidate.product_id.clone(), candidate);
                    }
                }
            }
            fallback
        };

        let mut lookup: Vec<ProductId> = pool.keys().cloned().collect();
        lookup.extend(
            fallback
                .iter()
                .filter(|c| !pool.contains_key(&c.product_id))
                .map(|c| c.product_id.clone()),
        );
        let products = self.store.get_products(&lookup).await?;
        let eligible: HashMap<&str, &Product> = products
            .iter()
            .filter(|p| p.active)
            .filter(|p| category.is_none_or(|c| category_matches(c, &p.category)))
            .map(|p| (p.id.as_str(), p))
            .collect();

        let before = pool.len();
        pool.retain(|product_id, candidate| match eligible.get(product_id.as_str()) {
            Some(product) => {
                candidate.category = product.category.clone();
                true
            }
            None => false,
        });
        if pool.len() < before {
            debug!(
                "Dropped {} unknown, inactive or off-category candidates",
                before - pool.len()
            );
        }

        let mut per_category: HashMap<Category, usize> = HashMap::new();
        if let Some(quota) = options.per_category {
            apply_quota(&mut pool, quota, &mut per_category);
        }

        let mut room = bound.saturating_sub(pool.len());
        for mut candidate in fallback {
            let Some(product) = eligible.get(candidate.product_id.as_str()) else {
                continue;
            };
            match pool.get_mut(&candidate.product_id) {
                Some(existing) => {
                    existing.metadata.sources.insert(CandidateSource::Trending);
                    existing.metadata.trending_rank = candidate.metadata.trending_rank;
                }
                None if room > 0 => {
                    if let Some(quota) = options.per_category {
                        let used = per_category.entry(product.category.clone()).or_insert(0);
                        if *used >= quota {
                            continue;
                        }
                        *used += 1;
                    }
                    candidate.category = product.category.clone();
                    pool.insert(candidate.product_id.clone(), candidate);
                    room -= 1;
                }
                None => {}
            }
        }

        let mut candidates: Vec<Candidate> = pool.into_values().collect();
        candidates.sort_by(compare_base);
        candidates.truncate(bound);

        debug!("Generated {} candidates", candidates.len());
        Ok(candidates)
    }
}

fn compare_base(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.base_score
        .total_cmp(&a.base_score)
        .then_with(|| a.product_id.cmp(&b.product_id))
}

/// Keep the `quota` best candidates of each category, recording the counts
fn apply_quota(
    pool: &mut BTreeMap<ProductId, Candidate>,
    quota: usize,
    counts: &mut HashMap<Category, usize>,
) {
    let mut ordered: Vec<&Candidate> = pool.values().collect();
    ordered.sort_by(|a, b| compare_base(a, b));

    let mut dropped: Vec<ProductId> = Vec::new();
    for candidate in ordered {
        let used = counts.entry(candidate.category.clone()).or_insert(0);
        if *used < quota {
            *used += 1;
        } else {
            dropped.push(candidate.product_id.clone());
        }
    }

    if !dropped.is_empty() {
        debug!("Category quota dropped {} candidates", dropped.len());
    }
    for product_id in dropped {
        pool.remove(&product_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestCatalog, view_for};
    use std::collections::HashSet;

    fn catalog() -> TestCatalog {
        TestCatalog::new()
            .product("phone", "electronics")
            .product("case", "electronics")
            .product("tent", "outdoors")
            .product("lamp", "home_garden")
            .inactive_product("pager", "electronics")
            .purchase("u1", "phone")
            .purchase("u2", "phone")
            .purchase("u2", "case")
            .purchase("u3", "tent")
            .purchase("u3", "pager")
            .interest("u1", "technology", "gadgets", 0.9)
    }

    #[tokio::test]
    async fn test_merged_pool_is_validated() {
        let store = catalog().store();
        let view = view_for(&store, "u1").await;

        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(10))
            .await
            .unwrap();

        let ids: HashSet<&str> = candidates.iter().map(|c| c.product_id.as_str()).collect();
        assert!(!ids.contains("phone"), "purchased product leaked");
        assert!(!ids.contains("pager"), "inactive product leaked");
        assert_eq!(ids.len(), candidates.len(), "duplicate candidates");

        let case = candidates.iter().find(|c| c.product_id == "case").unwrap();
        assert!(case.metadata.sources.contains(&CandidateSource::CoPurchase));
        assert!(case.metadata.sources.contains(&CandidateSource::SharedInterest));
        assert_eq!(case.category, "electronics");
    }

    #[tokio::test]
    async fn test_topped_up_from_trending() {
        let store = catalog().store();
        let view = view_for(&store, "u1").await;

        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(10))
            .await
            .unwrap();

        // case is the only personalized hit; tent and lamp come from trending
        let ids: HashSet<&str> = candidates.iter().map(|c| c.product_id.as_str()).collect();
        assert!(ids.contains("tent"));
        assert!(ids.contains("lamp"));
        assert_eq!(candidates[0].product_id, "case");
    }

    #[tokio::test]
    async fn test_source_thresholds_prune_weak_signals() {
        let store = catalog().store();
        let view = view_for(&store, "u1").await;

        let candidates = CandidateGenerator::new(store)
            .with_min_co_purchase_strength(0.75)
            .with_min_interest_weight(0.95)
            .generate(&view, &GenerateOptions::new(10))
            .await
            .unwrap();

        // case is still reachable through trending, but neither weak signal counts
        let case = candidates.iter().find(|c| c.product_id == "case").unwrap();
        assert!(!case.metadata.sources.contains(&CandidateSource::CoPurchase));
        assert!(!case.metadata.sources.contains(&CandidateSource::SharedInterest));
        assert!(case.metadata.sources.contains(&CandidateSource::Trending));
    }

    /// u1 owns one book; its co-buyers bought eight more books, while a tent
    /// and a lamp sold once each.
    fn bookish() -> TestCatalog {
        let mut catalog = TestCatalog::new()
            .product("tent", "outdoors")
            .product("lamp", "home_garden");
        for n in 0..=8 {
            catalog = catalog.product(&format!("b{n}"), "books");
        }
        catalog = catalog
            .purchase("u1", "b0")
            .purchase("w1", "tent")
            .purchase("w2", "lamp");
        for buyer in ["v1", "v2", "v3"] {
            for n in 0..=8 {
                catalog = catalog.purchase(buyer, &format!("b{n}"));
            }
        }
        catalog
    }

    #[tokio::test]
    async fn test_category_request_reaches_past_the_bound() {
        let store = bookish().store();
        let view = view_for(&store, "u1").await;
        let generator = CandidateGenerator::new(store);

        let open = generator
            .generate(&view, &GenerateOptions::new(4))
            .await
            .unwrap();
        assert!(open.iter().all(|c| c.category == "books"));

        let options = GenerateOptions::new(4).with_category(Some("outdoors".to_string()));
        let outdoors = generator.generate(&view, &options).await.unwrap();
        let ids: Vec<&str> = outdoors.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(ids, vec!["tent"]);
        assert_eq!(outdoors[0].source, CandidateSource::Trending);
    }

    #[tokio::test]
    async fn test_category_quota_leaves_room_for_other_categories() {
        let store = bookish().store();
        let view = view_for(&store, "u1").await;

        let options = GenerateOptions::new(4).with_per_category(Some(2));
        let candidates = CandidateGenerator::new(store)
            .generate(&view, &options)
            .await
            .unwrap();

        let books = candidates.iter().filter(|c| c.category == "books").count();
        let ids: HashSet<&str> = candidates.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(candidates.len(), 4);
        assert_eq!(books, 2);
        assert!(ids.contains("tent"));
        assert!(ids.contains("lamp"));
    }

    #[tokio::test]
    async fn test_empty_view_follows_purchase_count_not_revenue() {
        let mut catalog = TestCatalog::new().product("cheap", "home").user("newcomer");
        for n in 0..10 {
            catalog = catalog.purchase_amount(&format!("c{n}"), "cheap", 1.0);
        }
        for n in 0..4 {
            let lux = format!("lux{n}");
            catalog = catalog
                .product(&lux, "jewelry")
                .purchase_amount(&format!("r{n}"), &lux, 500.0);
        }
        let store = catalog.store();
        let view = view_for(&store, "newcomer").await;

        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(1))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].product_id, "cheap");
    }

    #[tokio::test]
    async fn test_empty_view_uses_trending() {
        let store = catalog().user("newcomer").store();
        let view = view_for(&store, "newcomer").await;
        assert!(view.is_empty());

        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(2))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates
            .iter()
            .all(|c| c.source == CandidateSource::Trending));
    }

    #[tokio::test]
    async fn test_bound_respected_and_ordered() {
        let store = catalog().store();
        let view = view_for(&store, "u1").await;

        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(2))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].base_score >= candidates[1].base_score);
    }

    #[tokio::test]
    async fn test_zero_bound() {
        let store = catalog().store();
        let view = view_for(&store, "u1").await;
        let candidates = CandidateGenerator::new(store)
            .generate(&view, &GenerateOptions::new(0))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
