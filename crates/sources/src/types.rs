//! Shared types for candidate generation.

use data_loader::{Category, InterestSource, ProductId, Timestamp, UserId, category_matches};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which source produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Bought together with something the user bought
    CoPurchase,
    /// Bought by users with overlapping purchase history
    SimilarUser,
    /// Sits in a category the user declared or showed interest in
    SharedInterest,
    /// Catalog-wide trend
    Trending,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::CoPurchase => "co_purchase",
            CandidateSource::SimilarUser => "similar_user",
            CandidateSource::SharedInterest => "shared_interest",
            CandidateSource::Trending => "trending",
        }
    }
}

/// Per-signal evidence collected while generating a candidate.
///
/// Each strength keeps the maximum seen across all paths that reached the
/// product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateMetadata {
    pub sources: BTreeSet<CandidateSource>,
    pub co_purchase_strength: Option<f32>,
    pub similar_user_strength: Option<f32>,
    pub interest_weight: Option<f32>,
    /// Interest value that led to this product
    pub matched_interest: Option<String>,
    /// Position in the trending list, 0 = hottest
    pub trending_rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub product_id: ProductId,
    /// Filled from the product record once the candidate is validated
    pub category: Category,
    /// Source with the strongest contribution so far
    pub source: CandidateSource,
    pub base_score: f32,
    pub metadata: CandidateMetadata,
}

impl Candidate {
    pub fn new(product_id: impl Into<ProductId>, source: CandidateSource, base_score: f32) -> Self {
        let mut metadata = CandidateMetadata::default();
        metadata.sources.insert(source);
        Self {
            product_id: product_id.into(),
            category: Category::new(),
            source,
            base_score,
            metadata,
        }
    }

    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.category = category.into();
        self
    }

    /// Fold another candidate for the same product into this one.
    ///
    /// Provenance is unioned and every signal keeps its maximum.
    pub fn merge(&mut self, other: Candidate) {
        debug_assert_eq!(self.product_id, other.product_id);

        self.metadata.sources.extend(other.metadata.sources);
        self.metadata.co_purchase_strength =
            max_opt(self.metadata.co_purchase_strength, other.metadata.co_purchase_strength);
        self.metadata.similar_user_strength =
            max_opt(self.metadata.similar_user_strength, other.metadata.similar_user_strength);

        match (self.metadata.interest_weight, other.metadata.interest_weight) {
            (Some(current), Some(incoming)) if incoming <= current => {}
            (_, Some(incoming)) => {
                self.metadata.interest_weight = Some(incoming);
                self.metadata.matched_interest = other.metadata.matched_interest;
            }
            _ => {}
        }

        self.metadata.trending_rank = match (self.metadata.trending_rank, other.metadata.trending_rank) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if other.base_score > self.base_score {
            self.base_score = other.base_score;
            self.source = other.source;
        }
        if self.category.is_empty() {
            self.category = other.category;
        }
    }
}

fn max_opt(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// One purchase as seen by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub product_id: ProductId,
    pub timestamp: Timestamp,
    pub amount: f64,
    pub category: Category,
}

/// An interest after supersession and decay
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedInterest {
    pub category: Category,
    pub value: String,
    /// Confidence as recorded
    pub confidence: f32,
    /// Confidence after time decay, in [0, 1]
    pub weighted_confidence: f32,
    pub source: InterestSource,
    pub created_at: Timestamp,
}

/// Everything the pipeline needs to know about a user, gathered once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureView {
    pub user_id: UserId,
    /// Logical "now" the view was computed against
    pub as_of: Timestamp,
    pub purchases: Vec<PurchaseRecord>,
    pub purchased: BTreeSet<ProductId>,
    /// Purchase records per category
    pub category_counts: BTreeMap<Category, u32>,
    /// Ordered by weighted confidence desc, then category and value
    pub interests: Vec<WeightedInterest>,
}

impl FeatureView {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            as_of: 0,
            purchases: Vec::new(),
            purchased: BTreeSet::new(),
            category_counts: BTreeMap::new(),
            interests: Vec::new(),
        }
    }

    /// No purchases and no interests: nothing to personalize on
    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty() && self.interests.is_empty()
    }

    pub fn has_purchased(&self, product_id: &str) -> bool {
        self.purchased.contains(product_id)
    }

    /// Strongest interest that applies to a product category.
    ///
    /// Interests are kept sorted, so the first match is the strongest.
    pub fn best_interest_for(&self, product_category: &str) -> Option<&WeightedInterest> {
        self.interests
            .iter()
            .find(|i| category_matches(&i.category, product_category))
    }

    /// Most purchased categories, most first
    pub fn top_categories(&self, n: usize) -> Vec<(&Category, u32)> {
        let mut categories: Vec<(&Category, u32)> =
            self.category_counts.iter().map(|(c, n)| (c, *n)).collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        categories.truncate(n);
        categories
    }
}
