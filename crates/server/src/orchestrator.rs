//! # Recommendation Orchestrator
//!
//! Coordinates one recommendation request:
//! 1. Validate the request and resolve the result count
//! 2. Look up the cache by user, options and catalog version
//! 3. Join an identical computation if one is already running
//! 4. Build the feature view and generate candidates
//! 5. Fetch features, score and rank
//! 6. Attach product details and cache the result
//!
//! Every store call runs under the store's own deadline. Cache failures are
//! logged and treated as misses.

use crate::cache::{Cache, MemoryCache};
use crate::config::{ConfigError, RecommenderConfig};
use crate::error::RecommendError;
use crate::single_flight::{FlightRole, SingleFlight};
use data_loader::{
    Category, DataIndex, InMemoryStore, Product, ProductId, StoreError, StoreReader, TimeoutStore,
};
use pipeline::{FeatureEngineer, Ranker, RankingOptions, Reason, ScoredCandidate, Scorer, SubScores};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sources::trending::rank_score;
use sources::{
    Candidate, CandidateGenerator, CandidateSource, GenerateOptions, SimilarUserSource,
    build_feature_view,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

type RecommendResult = Result<Vec<Recommendation>, RecommendError>;

/// Per-request knobs on top of the count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendOptions {
    /// Only recommend products in this category (aliases included)
    pub category: Option<Category>,
    /// Allow products the user already bought
    pub repurchase: bool,
    /// Maximum results per category; falls back to the configured cap
    pub diversity_cap: Option<usize>,
}

/// Final recommendation returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub name: String,
    pub category: Category,
    pub price: f64,
    pub score: f32,
    pub reason: Reason,
    pub sub_scores: SubScores,
    pub sources: Vec<CandidateSource>,
}

/// A user action on a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    Purchase,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "view" => Ok(InteractionKind::View),
            "click" => Ok(InteractionKind::Click),
            "purchase" => Ok(InteractionKind::Purchase),
            other => Err(RecommendError::InvalidRequest(format!(
                "unknown interaction kind `{other}`"
            ))),
        }
    }
}

/// Cache effectiveness since the orchestrator was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses that joined a computation already in flight
    pub collapsed: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    collapsed: AtomicU64,
}

/// Main orchestrator that coordinates the recommendation pipeline
#[derive(Clone)]
pub struct RecommendationOrchestrator {
    store: Arc<dyn StoreReader>,
    cache: Arc<dyn Cache>,
    config: Arc<RecommenderConfig>,
    generator: Arc<CandidateGenerator>,
    similar_users: Arc<SimilarUserSource>,
    feature_engineer: FeatureEngineer,
    scorer: Scorer,
    ranker: Ranker,
    in_flight: Arc<SingleFlight<RecommendResult>>,
    counters: Arc<Counters>,
}

impl RecommendationOrchestrator {
    /// Create an orchestrator over `store` and `cache`.
    ///
    /// The store is used as given; wrap it in a `TimeoutStore` to bound its
    /// calls.
    pub fn new(
        store: Arc<dyn StoreReader>,
        cache: Arc<dyn Cache>,
        config: RecommenderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let scorer = Scorer::new(config.scoring.weights)?;
        let generator = CandidateGenerator::new(store.clone())
            .with_similar_users(config.profile.similar_users)
            .with_min_co_purchase_strength(config.scoring.min_co_purchase_strength)
            .with_min_interest_weight(config.scoring.min_interest_weight);
        let similar_users =
            SimilarUserSource::new(store.clone()).with_neighbours(config.profile.similar_users);
        let feature_engineer =
            FeatureEngineer::new(store.clone()).with_concurrency(config.scoring.concurrency);

        Ok(Self {
            store,
            cache,
            config: Arc::new(config),
            generator: Arc::new(generator),
            similar_users: Arc::new(similar_users),
            feature_engineer,
            scorer,
            ranker: Ranker::new(),
            in_flight: Arc::new(SingleFlight::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    /// In-memory catalog with the configured store deadline and a
    /// process-local cache
    pub fn from_index(index: Arc<DataIndex>, config: RecommenderConfig) -> Result<Self, ConfigError> {
        let store = TimeoutStore::new(InMemoryStore::new(index), config.store_timeout());
        Self::new(Arc::new(store), Arc::new(MemoryCache::new()), config)
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Main entry point: ranked recommendations for a user.
    ///
    /// A `count` of 0 means the configured default; larger counts are capped
    /// at the configured maximum.
    #[instrument(skip_all, fields(user_id = %user_id, count = count))]
    pub async fn recommend(
        &self,
        user_id: &str,
        count: usize,
        options: &RecommendOptions,
    ) -> RecommendResult {
        let start_time = Instant::now();

        let user_id = validate_user_id(user_id)?;
        let ranking = self.ranking_options(self.resolve_count(count), options)?;
        let snapshot = self.store.snapshot().await?;
        let key = recommendation_key(user_id, &ranking, snapshot.version);

        if let Some(cached) = self.cache_lookup::<Vec<Recommendation>>(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for {}", key);
            return Ok(cached);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let (result, role) = self
            .in_flight
            .run(&key, || self.compute_recommendations(user_id, &ranking, &key))
            .await;
        if role == FlightRole::Follower {
            self.counters.collapsed.fetch_add(1, Ordering::Relaxed);
            debug!("Joined in-flight computation for {}", key);
        }

        if let Ok(recommendations) = &result {
            info!(
                "Served {} recommendations for user {} in {:.2?}",
                recommendations.len(),
                user_id,
                start_time.elapsed()
            );
        }
        result
    }

    async fn compute_recommendations(
        &self,
        user_id: &str,
        ranking: &RankingOptions,
        key: &str,
    ) -> RecommendResult {
        let view = build_feature_view(self.store.as_ref(), user_id, &self.config.aggregation()).await?;
        info!(
            "Built feature view for user {}: {} purchases, {} interests",
            user_id,
            view.purchases.len(),
            view.interests.len()
        );

        let multiplier = self.config.scoring.candidate_multiplier;
        let generate = GenerateOptions::new(ranking.limit.saturating_mul(multiplier))
            .with_repurchase(ranking.repurchase)
            .with_category(ranking.category.clone())
            .with_per_category(ranking.diversity_cap.map(|cap| cap.saturating_mul(multiplier)));
        let candidates = self.generator.generate(&view, &generate).await?;
        info!("Generated {} candidates", candidates.len());

        let features = self.feature_engineer.compute_features(&candidates).await?;
        let scored = self.scorer.score_all(&candidates, &features, &view);
        let ranked = self.ranker.rank(scored, &view, ranking);
        info!("Ranked {} of {} candidates", ranked.len(), candidates.len());

        let recommendations = self.attach_products(ranked).await?;
        self.cache_store(key, &recommendations, self.config.recommendations_ttl())
            .await;
        Ok(recommendations)
    }

    async fn attach_products(&self, ranked: Vec<ScoredCandidate>) -> RecommendResult {
        let ids: Vec<ProductId> = ranked.iter().map(|c| c.product_id.clone()).collect();
        let products = self.store.get_products(&ids).await?;
        let by_id: HashMap<&str, &Product> = products.iter().map(|p| (p.id.as_str(), p)).collect();

        let recommendations = ranked
            .into_iter()
            .filter_map(|candidate| {
                let Some(product) = by_id.get(candidate.product_id.as_str()) else {
                    warn!("Product {} vanished before enrichment", candidate.product_id);
                    return None;
                };
                Some(Recommendation {
                    product_id: candidate.product_id,
                    name: product.name.clone(),
                    category: candidate.category,
                    price: product.price,
                    score: candidate.score,
                    reason: candidate.reason,
                    sub_scores: candidate.sub_scores,
                    sources: candidate.sources.into_iter().collect(),
                })
            })
            .collect();
        Ok(recommendations)
    }

    /// Most popular active products, independent of any user
    #[instrument(skip_all, fields(count = count))]
    pub async fn trending(&self, count: usize) -> RecommendResult {
        let count = self.resolve_count(count);
        let snapshot = self.store.snapshot().await?;
        let key = format!("trending:{}:v{}", count, snapshot.version);

        if let Some(cached) = self.cache_lookup::<Vec<Recommendation>>(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let (result, role) = self
            .in_flight
            .run(&key, || self.compute_trending(count, &key))
            .await;
        if role == FlightRole::Follower {
            self.counters.collapsed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn compute_trending(&self, count: usize, key: &str) -> RecommendResult {
        let ids = self.store.trending_products(count).await?;
        let products = self.store.get_products(&ids).await?;
        let by_id: HashMap<&str, &Product> = products.iter().map(|p| (p.id.as_str(), p)).collect();
        let active: Vec<&Product> = ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .filter(|p| p.active)
            .collect();

        let total = active.len();
        let candidates: Vec<Candidate> = active
            .iter()
            .enumerate()
            .map(|(rank, product)| {
                let mut candidate =
                    Candidate::new(product.id.clone(), CandidateSource::Trending, rank_score(rank, total))
                        .with_category(product.category.clone());
                candidate.metadata.trending_rank = Some(rank);
                candidate
            })
            .collect();
        let features = self.feature_engineer.compute_features(&candidates).await?;

        let recommendations: Vec<Recommendation> = active
            .into_iter()
            .zip(candidates)
            .zip(features)
            .map(|((product, candidate), features)| Recommendation {
                product_id: candidate.product_id,
                name: product.name.clone(),
                category: candidate.category,
                price: product.price,
                score: candidate.base_score,
                reason: Reason::Trending,
                sub_scores: SubScores {
                    popularity: features.stats.popularity,
                    recency: features.stats.recency,
                    ..SubScores::default()
                },
                sources: vec![CandidateSource::Trending],
            })
            .collect();

        info!("Computed {} trending products", recommendations.len());
        self.cache_store(key, &recommendations, self.config.trending_ttl())
            .await;
        Ok(recommendations)
    }

    /// Products bought by the user's closest shoppers, ranked by the
    /// similarity of the closest one who bought each.
    ///
    /// Users without purchases, or without overlapping shoppers, get an empty
    /// list. Results are cached under the user so `invalidate_user` drops them.
    #[instrument(skip_all, fields(user_id = %user_id, count = count))]
    pub async fn similar_user_recommendations(
        &self,
        user_id: &str,
        count: usize,
    ) -> RecommendResult {
        let user_id = validate_user_id(user_id)?;
        let count = self.resolve_count(count);
        let snapshot = self.store.snapshot().await?;
        let key = format!(
            "recs:{}:similar:{}:v{}",
            key_segment(user_id),
            count,
            snapshot.version
        );

        if let Some(cached) = self.cache_lookup::<Vec<Recommendation>>(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let (result, role) = self
            .in_flight
            .run(&key, || self.compute_similar_user(user_id, count, &key))
            .await;
        if role == FlightRole::Follower {
            self.counters.collapsed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn compute_similar_user(&self, user_id: &str, count: usize, key: &str) -> RecommendResult {
        let view = build_feature_view(self.store.as_ref(), user_id, &self.config.aggregation()).await?;
        let mut candidates = self.similar_users.get_candidates(&view, false).await?;

        let ids: Vec<ProductId> = candidates.iter().map(|c| c.product_id.clone()).collect();
        let products = self.store.get_products(&ids).await?;
        let active: HashMap<&str, &Product> = products
            .iter()
            .filter(|p| p.active)
            .map(|p| (p.id.as_str(), p))
            .collect();

        candidates.retain(|c| active.contains_key(c.product_id.as_str()));
        candidates.sort_by(|a, b| {
            b.base_score
                .total_cmp(&a.base_score)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        candidates.truncate(count);

        let features = self.feature_engineer.compute_features(&candidates).await?;
        let recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .zip(features)
            .filter_map(|(candidate, features)| {
                let product = active.get(candidate.product_id.as_str())?;
                Some(Recommendation {
                    name: product.name.clone(),
                    category: product.category.clone(),
                    price: product.price,
                    score: candidate.base_score,
                    reason: Reason::SimilarUser,
                    sub_scores: SubScores {
                        purchase_affinity: candidate.base_score,
                        popularity: features.stats.popularity,
                        recency: features.stats.recency,
                        ..SubScores::default()
                    },
                    sources: vec![CandidateSource::SimilarUser],
                    product_id: candidate.product_id,
                })
            })
            .collect();

        info!(
            "Computed {} similar-user recommendations for user {}",
            recommendations.len(),
            user_id
        );
        self.cache_store(key, &recommendations, self.config.recommendations_ttl())
            .await;
        Ok(recommendations)
    }

    /// Drop every cached recommendation list for the user.
    ///
    /// Returns how many entries were removed; a failing cache removes none.
    pub async fn invalidate_user(&self, user_id: &str) -> Result<usize, RecommendError> {
        let user_id = validate_user_id(user_id)?;
        let prefix = format!("recs:{}:", key_segment(user_id));

        match self.cache.delete_prefix(&prefix).await {
            Ok(removed) => {
                debug!("Invalidated {} cached lists for user {}", removed, user_id);
                Ok(removed)
            }
            Err(e) => {
                warn!("Cache invalidation failed for user {}: {}", user_id, e);
                Ok(0)
            }
        }
    }

    /// Record a user action. Purchases invalidate the user's cached lists.
    #[instrument(skip_all, fields(user_id = %user_id, product_id = %product_id, kind = %kind))]
    pub async fn record_interaction(
        &self,
        user_id: &str,
        product_id: &str,
        kind: InteractionKind,
    ) -> Result<(), RecommendError> {
        let user_id = validate_user_id(user_id)?;
        self.store.get_user(user_id).await?;

        let products = self.store.get_products(&[product_id.to_string()]).await?;
        if products.is_empty() {
            return Err(StoreError::product_not_found(product_id).into());
        }

        info!("Recorded {} of product {} by user {}", kind, product_id, user_id);

        if kind == InteractionKind::Purchase {
            self.invalidate_user(user_id).await?;
        }
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            collapsed: self.counters.collapsed.load(Ordering::Relaxed),
        }
    }

    fn resolve_count(&self, count: usize) -> usize {
        match count {
            0 => self.config.ranking.default_count,
            n => n.min(self.config.ranking.max_count),
        }
    }

    fn ranking_options(
        &self,
        limit: usize,
        options: &RecommendOptions,
    ) -> Result<RankingOptions, RecommendError> {
        if options.diversity_cap == Some(0) {
            return Err(RecommendError::InvalidRequest(
                "diversity cap must be at least 1".to_string(),
            ));
        }

        let category = options
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(RankingOptions {
            limit,
            category,
            repurchase: options.repurchase,
            diversity_cap: options.diversity_cap.or(self.config.ranking.diversity_cap),
        })
    }

    async fn cache_lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn cache_store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, raw, ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<&str, RecommendError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(RecommendError::InvalidRequest(
            "user id must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Escape the key separator so one user's prefix never matches another's
fn key_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

fn recommendation_key(user_id: &str, ranking: &RankingOptions, version: u64) -> String {
    let category = ranking
        .category
        .as_deref()
        .map(key_segment)
        .unwrap_or_else(|| "*".to_string());
    let cap = ranking
        .diversity_cap
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "recs:{}:{}:{}:{}:{}:v{}",
        key_segment(user_id),
        ranking.limit,
        category,
        u8::from(ranking.repurchase),
        cap,
        version
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use async_trait::async_trait;
    use data_loader::{
        CatalogSnapshot, Interest, InterestSource, Metadata, ProductStats, Purchase, StoreResult,
        User, WeightedEdge,
    };
    use std::sync::atomic::AtomicUsize;
    use tokio::task::JoinSet;

    // ============================================================================
    // Test Fixtures
    // ============================================================================

    struct Catalog {
        index: DataIndex,
        next_ts: i64,
    }

    impl Catalog {
        fn new() -> Self {
            Self {
                index: DataIndex::new(),
                next_ts: 1_700_000_000,
            }
        }

        fn user(&mut self, id: &str) {
            if self.index.get_user(id).is_none() {
                self.index.insert_user(User {
                    id: id.to_string(),
                    email: format!("{id}@example.com"),
                    profile: Metadata::new(),
                    created_at: 0,
                    updated_at: 0,
                });
            }
        }

        fn product(&mut self, id: &str, category: &str) {
            self.index.insert_product(Product {
                id: id.to_string(),
                name: format!("Product {id}"),
                category: category.to_string(),
                price: 19.5,
                description: String::new(),
                image_url: None,
                active: true,
                metadata: Metadata::new(),
            });
        }

        fn purchase(&mut self, user: &str, product: &str) {
            self.purchase_amount(user, product, 19.5);
        }

        fn purchase_amount(&mut self, user: &str, product: &str, amount: f64) {
            self.user(user);
            self.next_ts += 60;
            self.index.insert_purchase(Purchase {
                id: format!("o{}", self.next_ts),
                user_id: user.to_string(),
                product_id: product.to_string(),
                amount,
                quantity: 1,
                category: String::new(),
                timestamp: self.next_ts,
                metadata: Metadata::new(),
            });
        }

        fn interest(&mut self, user: &str, category: &str, confidence: f32) {
            self.user(user);
            self.next_ts += 60;
            self.index.insert_interest(Interest {
                id: format!("i{}", self.next_ts),
                user_id: user.to_string(),
                category: category.to_string(),
                value: format!("{category}-fan"),
                confidence,
                source: InterestSource::Explicit,
                created_at: self.next_ts,
            });
        }

        fn build(mut self) -> Arc<DataIndex> {
            self.index.recompute_relationships();
            Arc::new(self.index)
        }
    }

    /// U bought P1 and likes electronics; P2 is popular, P3 is not
    fn shop() -> Arc<DataIndex> {
        let mut catalog = Catalog::new();
        catalog.product("P1", "electronics");
        catalog.product("P2", "electronics");
        catalog.product("P3", "outdoors");
        catalog.purchase("U", "P1");
        for buyer in ["v1", "v2", "v3", "v4"] {
            catalog.purchase(buyer, "P2");
        }
        catalog.purchase("w1", "P3");
        catalog.interest("U", "electronics", 0.9);
        catalog.build()
    }

    fn bookshop() -> Arc<DataIndex> {
        let mut catalog = Catalog::new();
        for (product, buyers) in [("Q1", 5), ("Q2", 4), ("Q3", 3), ("Q4", 2)] {
            catalog.product(product, "books");
            for i in 0..buyers {
                catalog.purchase(&format!("b{i}"), product);
            }
        }
        catalog.build()
    }

    /// One cheap product bought ten times against four luxury products bought
    /// once each for far more revenue, plus unsold filler
    fn revenue_skewed() -> Arc<DataIndex> {
        let mut catalog = Catalog::new();
        catalog.user("newcomer");
        catalog.product("cheap", "home");
        for n in 0..10 {
            catalog.purchase_amount(&format!("c{n}"), "cheap", 1.0);
        }
        for n in 0..4 {
            let lux = format!("lux{n}");
            catalog.product(&lux, "jewelry");
            catalog.purchase_amount(&format!("r{n}"), &lux, 500.0);
        }
        for n in 0..10 {
            catalog.product(&format!("idle{n}"), "misc");
        }
        catalog.build()
    }

    /// U owns one book; three co-buyers own twelve, a tent and a lamp sold once
    fn bookshelf() -> Arc<DataIndex> {
        let mut catalog = Catalog::new();
        catalog.product("tent", "outdoors");
        catalog.product("lamp", "home_garden");
        for n in 0..12 {
            catalog.product(&format!("book{n:02}"), "books");
        }
        catalog.purchase("U", "book00");
        for buyer in ["v1", "v2", "v3"] {
            for n in 0..12 {
                catalog.purchase(buyer, &format!("book{n:02}"));
            }
        }
        catalog.purchase("w1", "tent");
        catalog.purchase("w2", "lamp");
        catalog.build()
    }

    /// Sleeps before answering get_user and counts the calls
    struct DelayedStore {
        inner: InMemoryStore,
        delay: Duration,
        user_lookups: AtomicUsize,
    }

    impl DelayedStore {
        fn new(index: Arc<DataIndex>, delay: Duration) -> Self {
            Self {
                inner: InMemoryStore::new(index),
                delay,
                user_lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StoreReader for DelayedStore {
        async fn snapshot(&self) -> StoreResult<CatalogSnapshot> {
            self.inner.snapshot().await
        }
        async fn get_user(&self, id: &str) -> StoreResult<User> {
            self.user_lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.get_user(id).await
        }
        async fn purchases_for_user(&self, id: &str) -> StoreResult<Vec<Purchase>> {
            self.inner.purchases_for_user(id).await
        }
        async fn interests_for_user(&self, id: &str) -> StoreResult<Vec<Interest>> {
            self.inner.interests_for_user(id).await
        }
        async fn get_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
            self.inner.get_products(ids).await
        }
        async fn product_stats(&self, id: &str) -> StoreResult<ProductStats> {
            self.inner.product_stats(id).await
        }
        async fn co_purchased_with(&self, id: &str) -> StoreResult<Vec<WeightedEdge>> {
            self.inner.co_purchased_with(id).await
        }
        async fn similar_users(&self, id: &str, limit: usize) -> StoreResult<Vec<WeightedEdge>> {
            self.inner.similar_users(id, limit).await
        }
        async fn purchased_products(&self, id: &str) -> StoreResult<Vec<ProductId>> {
            self.inner.purchased_products(id).await
        }
        async fn products_in_category(&self, c: &str) -> StoreResult<Vec<ProductId>> {
            self.inner.products_in_category(c).await
        }
        async fn trending_products(&self, limit: usize) -> StoreResult<Vec<ProductId>> {
            self.inner.trending_products(limit).await
        }
        async fn popular_products(
            &self,
            category: Option<&str>,
            limit: usize,
        ) -> StoreResult<Vec<ProductId>> {
            self.inner.popular_products(category, limit).await
        }
    }

    /// Every call fails
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    fn orchestrator(index: Arc<DataIndex>) -> RecommendationOrchestrator {
        RecommendationOrchestrator::from_index(index, RecommenderConfig::default()).unwrap()
    }

    fn ids(recommendations: &[Recommendation]) -> Vec<&str> {
        recommendations.iter().map(|r| r.product_id.as_str()).collect()
    }

    // ============================================================================
    // Tests
    // ============================================================================

    #[tokio::test]
    async fn test_recommend_returns_ranked_products() {
        let orchestrator = orchestrator(shop());
        let recs = orchestrator
            .recommend("U", 2, &RecommendOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&recs), vec!["P2", "P3"]);
        assert_eq!(recs[0].name, "Product P2");
        assert_eq!(recs[0].reason, Reason::InterestMatch);
        assert_eq!(recs[1].reason, Reason::Trending);
        assert!(recs[0].score > recs[1].score);
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let orchestrator = orchestrator(shop());
        let options = RecommendOptions::default();

        let first = orchestrator.recommend("U", 2, &options).await.unwrap();
        let second = orchestrator.recommend("U", 2, &options).await.unwrap();

        assert_eq!(first, second);
        let stats = orchestrator.cache_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_different_options_use_different_entries() {
        let orchestrator = orchestrator(shop());
        orchestrator
            .recommend("U", 2, &RecommendOptions::default())
            .await
            .unwrap();
        let repurchase = RecommendOptions {
            repurchase: true,
            ..RecommendOptions::default()
        };
        let recs = orchestrator.recommend("U", 5, &repurchase).await.unwrap();

        assert!(ids(&recs).contains(&"P1"));
        assert_eq!(orchestrator.cache_stats().hits, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let err = orchestrator(shop())
            .recommend("ghost", 5, &RecommendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RecommendError::NotFound {
                entity: "user",
                id: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let orchestrator = orchestrator(shop());

        let blank = orchestrator
            .recommend("  ", 5, &RecommendOptions::default())
            .await;
        assert!(matches!(blank, Err(RecommendError::InvalidRequest(_))));

        let zero_cap = RecommendOptions {
            diversity_cap: Some(0),
            ..RecommendOptions::default()
        };
        let capped = orchestrator.recommend("U", 5, &zero_cap).await;
        assert!(matches!(capped, Err(RecommendError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_count_defaults_and_caps() {
        let mut config = RecommenderConfig::default();
        config.ranking.default_count = 1;
        config.ranking.max_count = 2;
        let orchestrator = RecommendationOrchestrator::from_index(bookshop(), config).unwrap();

        let catalog_user = "b0";
        let defaulted = orchestrator
            .recommend(catalog_user, 0, &RecommendOptions {
                repurchase: true,
                ..RecommendOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(defaulted.len(), 1);

        let capped = orchestrator.trending(100).await.unwrap();
        assert_eq!(ids(&capped), vec!["Q1", "Q2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_identical_concurrent_requests_collapse() {
        let store = Arc::new(DelayedStore::new(shop(), Duration::from_millis(100)));
        let orchestrator = RecommendationOrchestrator::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            RecommenderConfig::default(),
        )
        .unwrap();

        let mut tasks = JoinSet::new();
        for _ in 0..6 {
            let orchestrator = orchestrator.clone();
            tasks.spawn(async move {
                orchestrator
                    .recommend("U", 2, &RecommendOptions::default())
                    .await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap().unwrap());
        }

        assert_eq!(store.user_lookups.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        let stats = orchestrator.cache_stats();
        assert_eq!(stats.misses, 6);
        assert_eq!(stats.collapsed, 5);
    }

    #[tokio::test]
    async fn test_slow_store_becomes_unavailable() {
        let slow = DelayedStore::new(shop(), Duration::from_millis(500));
        let store = TimeoutStore::new(slow, Duration::from_millis(20));
        let orchestrator = RecommendationOrchestrator::new(
            Arc::new(store),
            Arc::new(MemoryCache::new()),
            RecommenderConfig::default(),
        )
        .unwrap();

        let err = orchestrator
            .recommend("U", 2, &RecommendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendError::StoreUnavailable {
                operation: "get_user",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_recompute() {
        let orchestrator = RecommendationOrchestrator::new(
            Arc::new(InMemoryStore::new(shop())),
            Arc::new(BrokenCache),
            RecommenderConfig::default(),
        )
        .unwrap();
        let options = RecommendOptions::default();

        let first = orchestrator.recommend("U", 2, &options).await.unwrap();
        let second = orchestrator.recommend("U", 2, &options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(orchestrator.cache_stats().hits, 0);
        assert_eq!(orchestrator.invalidate_user("U").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purchase_invalidates_cached_lists() {
        let cache = Arc::new(MemoryCache::new());
        let orchestrator = RecommendationOrchestrator::new(
            Arc::new(InMemoryStore::new(shop())),
            cache.clone(),
            RecommenderConfig::default(),
        )
        .unwrap();

        orchestrator
            .recommend("U", 2, &RecommendOptions::default())
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        orchestrator
            .record_interaction("U", "P2", InteractionKind::View)
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        orchestrator
            .record_interaction("U", "P2", InteractionKind::Purchase)
            .await
            .unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_interaction_with_unknown_product() {
        let err = orchestrator(shop())
            .record_interaction("U", "nope", InteractionKind::Click)
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn test_trending_is_popularity_ordered_and_cached() {
        let orchestrator = orchestrator(bookshop());

        let first = orchestrator.trending(3).await.unwrap();
        assert_eq!(ids(&first), vec!["Q1", "Q2", "Q3"]);
        assert!(first.iter().all(|r| r.reason == Reason::Trending));
        assert!(first.windows(2).all(|w| w[0].score > w[1].score));
        assert_eq!(first[0].sub_scores.popularity, 1.0);

        let second = orchestrator.trending(3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(orchestrator.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_newcomer_gets_most_purchased_not_highest_revenue() {
        let orchestrator = orchestrator(revenue_skewed());

        let recs = orchestrator
            .recommend("newcomer", 1, &RecommendOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&recs), vec!["cheap"]);
        assert_eq!(recs[0].reason, Reason::Trending);
    }

    #[tokio::test]
    async fn test_category_request_finds_products_outside_the_pool() {
        let orchestrator = orchestrator(bookshelf());
        let outdoors = RecommendOptions {
            category: Some("outdoors".to_string()),
            ..RecommendOptions::default()
        };

        let recs = orchestrator.recommend("U", 3, &outdoors).await.unwrap();
        assert_eq!(ids(&recs), vec!["tent"]);

        let misc = RecommendOptions {
            category: Some("misc".to_string()),
            ..RecommendOptions::default()
        };
        let recs = self::orchestrator(revenue_skewed())
            .recommend("newcomer", 2, &misc)
            .await
            .unwrap();
        assert_eq!(ids(&recs), vec!["idle0", "idle1"]);
    }

    #[tokio::test]
    async fn test_diversity_cap_fills_from_other_categories() {
        let orchestrator = orchestrator(bookshelf());
        let capped = RecommendOptions {
            diversity_cap: Some(1),
            ..RecommendOptions::default()
        };

        let recs = orchestrator.recommend("U", 2, &capped).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].category, "books");
        assert_eq!(recs[1].product_id, "lamp");
    }

    #[tokio::test]
    async fn test_weak_co_purchase_edges_ignored_when_configured() {
        let mut catalog = Catalog::new();
        for product in ["A", "S", "W"] {
            catalog.product(product, "kitchen");
        }
        catalog.purchase("U", "A");
        for buyer in ["v1", "v2", "v3", "v4"] {
            catalog.purchase(buyer, "A");
            catalog.purchase(buyer, "S");
        }
        catalog.purchase("v5", "A");
        catalog.purchase("v5", "W");
        let index = catalog.build();

        let co_purchased = |recs: &[Recommendation], id: &str| {
            recs.iter()
                .find(|r| r.product_id == id)
                .is_some_and(|r| r.sources.contains(&CandidateSource::CoPurchase))
        };

        let recs = orchestrator(index.clone())
            .recommend("U", 5, &RecommendOptions::default())
            .await
            .unwrap();
        assert!(co_purchased(&recs, "S"));
        assert!(co_purchased(&recs, "W"));

        let mut config = RecommenderConfig::default();
        config.scoring.min_co_purchase_strength = 0.5;
        let recs = RecommendationOrchestrator::from_index(index, config)
            .unwrap()
            .recommend("U", 5, &RecommendOptions::default())
            .await
            .unwrap();
        assert!(co_purchased(&recs, "S"));
        assert!(ids(&recs).contains(&"W"));
        assert!(!co_purchased(&recs, "W"));
    }

    #[tokio::test]
    async fn test_similar_user_recommendations_cached_under_user() {
        let cache = Arc::new(MemoryCache::new());
        let orchestrator = RecommendationOrchestrator::new(
            Arc::new(InMemoryStore::new(bookshelf())),
            cache.clone(),
            RecommenderConfig::default(),
        )
        .unwrap();

        let first = orchestrator.similar_user_recommendations("U", 3).await.unwrap();
        assert_eq!(ids(&first), vec!["book01", "book02", "book03"]);
        assert!(first.iter().all(|r| r.reason == Reason::SimilarUser));
        assert!(first.iter().all(|r| r.sources == vec![CandidateSource::SimilarUser]));
        assert!((first[0].score - 1.0 / 12.0).abs() < 1e-6);

        let second = orchestrator.similar_user_recommendations("U", 3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(orchestrator.cache_stats().hits, 1);

        assert_eq!(orchestrator.invalidate_user("U").await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_similar_user_recommendations_edge_cases() {
        let orchestrator = orchestrator(bookshelf());

        let lonely = orchestrator.similar_user_recommendations("w1", 3).await.unwrap();
        assert!(lonely.is_empty());

        let err = orchestrator
            .similar_user_recommendations("ghost", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn test_keys_separate_users_sharing_a_prefix() {
        let ranking = RankingOptions::new(5);
        let plain = recommendation_key("u1", &ranking, 3);
        let tricky = recommendation_key("u1:x", &ranking, 3);

        assert!(plain.starts_with("recs:u1:"));
        assert!(!tricky.starts_with("recs:u1:"));
    }

    #[test]
    fn test_interaction_kind_parsing() {
        assert_eq!("Purchase".parse::<InteractionKind>().unwrap(), InteractionKind::Purchase);
        assert!("like".parse::<InteractionKind>().is_err());
    }
}
