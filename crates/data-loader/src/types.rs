//! Core domain types for the marketing dataset.
//!
//! Users, products, purchases and interests are the recorded facts. Everything
//! else in `DataIndex` (buyer sets, co-purchase edges, product statistics,
//! trending order) is derived from them and recomputed, never edited by hand.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = String;

/// Unique identifier for a product
pub type ProductId = String;

/// Product or interest category, stored lowercase
pub type Category = String;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Free-form key/value attributes attached to records
pub type Metadata = BTreeMap<String, serde_json::Value>;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Default look-back used for "recent" purchase statistics
pub const DEFAULT_TRENDING_WINDOW_DAYS: u32 = 30;

// =============================================================================
// Recorded facts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default, alias = "profile_data")]
    pub profile: Metadata,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Category,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Inactive products stay in the catalog but are never recommended
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, alias = "extra_data")]
    pub metadata: Metadata,
}

fn default_active() -> bool {
    true
}

/// A single recorded purchase. Append-only per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: String,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub amount: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Copied from the product when the source record leaves it blank
    #[serde(default)]
    pub category: Category,
    pub timestamp: Timestamp,
    #[serde(default, alias = "extra_data")]
    pub metadata: Metadata,
}

fn default_quantity() -> u32 {
    1
}

/// Where an interest signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestSource {
    #[serde(alias = "survey")]
    Explicit,
    #[serde(alias = "purchase", alias = "purchase_analysis")]
    InferredFromPurchase,
    #[serde(alias = "behavior", alias = "browsing")]
    InferredFromBrowsing,
}

/// A scored interest. Several records may exist for the same
/// (user, category, value); the newest one supersedes the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interest {
    pub id: String,
    pub user_id: UserId,
    #[serde(alias = "interest_category")]
    pub category: Category,
    #[serde(alias = "interest_value")]
    pub value: String,
    #[serde(alias = "confidence_score")]
    pub confidence: f32,
    pub source: InterestSource,
    pub created_at: Timestamp,
}

// =============================================================================
// Derived data
// =============================================================================

/// Precomputed purchase statistics for a product.
///
/// `popularity` and `recency` are normalized against the catalog maximum so
/// they always fall in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub purchase_count: u32,
    pub recent_purchase_count: u32,
    pub total_revenue: f64,
    pub recent_revenue: f64,
    pub popularity: f32,
    pub recency: f32,
    pub trend_score: f64,
}

/// Weighted relationship to another node (product or user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEdge {
    pub target: String,
    /// Normalized strength in [0, 1]
    pub strength: f32,
    /// Raw supporting count behind the strength
    pub count: u32,
}

/// Identity of the data a computation was run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Changes whenever a fact is inserted or relationships are recomputed
    pub version: u64,
    /// Latest event timestamp; the deterministic "now" for decay and windows
    pub as_of: Timestamp,
}

// =============================================================================
// Categories
// =============================================================================

/// Interest categories and the product category each one maps onto
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("fashion", "clothing"),
    ("technology", "electronics"),
    ("food", "food_beverage"),
    ("travel", "travel_services"),
    ("fitness", "fitness_equipment"),
    ("home", "home_garden"),
    ("beauty", "beauty_personal_care"),
    ("books", "books_media"),
    ("sports", "sports_outdoors"),
];

/// Lowercase and trim a category label
pub fn normalize_category(raw: &str) -> Category {
    raw.trim().to_lowercase()
}

/// Every category label equivalent to `category`, itself included.
///
/// Returned in a fixed order so callers iterate deterministically.
pub fn equivalent_categories(category: &str) -> Vec<Category> {
    let category = normalize_category(category);
    let mut out = vec![category.clone()];
    for (interest, product) in CATEGORY_ALIASES {
        if *interest == category {
            out.push(product.to_string());
        } else if *product == category {
            out.push(interest.to_string());
        }
    }
    out
}

/// Whether an interest category applies to a product category
pub fn category_matches(interest_category: &str, product_category: &str) -> bool {
    let product_category = normalize_category(product_category);
    equivalent_categories(interest_category)
        .iter()
        .any(|c| *c == product_category)
}

// =============================================================================
// DataIndex - The In-Memory Catalog
// =============================================================================

/// Holds every recorded fact plus the derived relationship indices.
#[derive(Debug)]
pub struct DataIndex {
    // Primary data stores
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) products: HashMap<ProductId, Product>,
    pub(crate) user_purchases: HashMap<UserId, Vec<Purchase>>,
    pub(crate) user_interests: HashMap<UserId, Vec<Interest>>,

    // Secondary indices
    /// Product ids per category, kept sorted
    pub(crate) category_index: BTreeMap<Category, Vec<ProductId>>,
    /// Distinct buyers of each product (purchased-by edges)
    pub(crate) buyers: HashMap<ProductId, BTreeSet<UserId>>,
    /// Distinct products bought by each user
    pub(crate) user_products: HashMap<UserId, BTreeSet<ProductId>>,

    // Derived relationships and statistics
    pub(crate) co_purchase: HashMap<ProductId, Vec<WeightedEdge>>,
    pub(crate) product_stats: HashMap<ProductId, ProductStats>,
    /// Active products ordered by trend score
    pub(crate) trending: Vec<ProductId>,
    /// Active products ordered by popularity
    pub(crate) popular: Vec<ProductId>,

    pub(crate) trending_window_days: u32,
    pub(crate) version: u64,
    pub(crate) as_of: Timestamp,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            products: HashMap::new(),
            user_purchases: HashMap::new(),
            user_interests: HashMap::new(),
            category_index: BTreeMap::new(),
            buyers: HashMap::new(),
            user_products: HashMap::new(),
            co_purchase: HashMap::new(),
            product_stats: HashMap::new(),
            trending: Vec::new(),
            popular: Vec::new(),
            trending_window_days: DEFAULT_TRENDING_WINDOW_DAYS,
            version: 0,
            as_of: 0,
        }
    }

    /// Use a different look-back for recent purchase statistics.
    ///
    /// Takes effect on the next `recompute_relationships`.
    pub fn with_trending_window_days(mut self, days: u32) -> Self {
        self.trending_window_days = days;
        self
    }

    pub fn get_user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn get_product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    /// All purchases made by a user, in insertion order
    pub fn get_user_purchases(&self, user_id: &str) -> &[Purchase] {
        self.user_purchases
            .get(user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All interest records for a user, superseded ones included
    pub fn get_user_interests(&self, user_id: &str) -> &[Interest] {
        self.user_interests
            .get(user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Product ids in a category (active and inactive), sorted
    pub fn get_products_by_category(&self, category: &str) -> &[ProductId] {
        self.category_index
            .get(&normalize_category(category))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct products a user has bought
    pub fn get_user_products(&self, user_id: &str) -> Option<&BTreeSet<ProductId>> {
        self.user_products.get(user_id)
    }

    /// Co-purchase edges out of a product, strongest first
    pub fn get_co_purchases(&self, product_id: &str) -> &[WeightedEdge] {
        self.co_purchase
            .get(product_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_product_stats(&self, product_id: &str) -> Option<&ProductStats> {
        self.product_stats.get(product_id)
    }

    /// Active products ordered by trend score, then id
    pub fn get_trending(&self) -> &[ProductId] {
        &self.trending
    }

    /// Active products ordered by popularity, then recency, then id
    pub fn get_popular(&self) -> &[ProductId] {
        &self.popular
    }

    /// The most popular active products of a category and its aliases
    pub fn popular_in_category(&self, category: &str, limit: usize) -> Vec<ProductId> {
        self.popular
            .iter()
            .filter(|id| {
                self.products
                    .get(id.as_str())
                    .is_some_and(|p| category_matches(category, &p.category))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// All product ids, sorted
    pub fn get_all_product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.products.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// All user ids, sorted
    pub fn get_all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            version: self.version,
            as_of: self.as_of,
        }
    }

    // Mutators - used during loading and ingestion

    pub fn insert_user(&mut self, user: User) {
        self.as_of = self.as_of.max(user.updated_at).max(user.created_at);
        self.users.insert(user.id.clone(), user);
        self.version += 1;
    }

    pub fn insert_product(&mut self, mut product: Product) {
        product.category = normalize_category(&product.category);
        let ids = self
            .category_index
            .entry(product.category.clone())
            .or_default();
        if let Err(pos) = ids.binary_search(&product.id) {
            ids.insert(pos, product.id.clone());
        }
        if let Some(previous) = self.products.insert(product.id.clone(), product.clone()) {
            if previous.category != product.category {
                if let Some(old) = self.category_index.get_mut(&previous.category) {
                    old.retain(|id| *id != product.id);
                }
            }
        }
        self.version += 1;
    }

    /// Record a purchase and update the buyer indices.
    ///
    /// Derived statistics are stale until `recompute_relationships` runs.
    pub fn insert_purchase(&mut self, mut purchase: Purchase) {
        if purchase.category.is_empty() {
            if let Some(product) = self.products.get(&purchase.product_id) {
                purchase.category = product.category.clone();
            }
        }
        purchase.category = normalize_category(&purchase.category);
        self.as_of = self.as_of.max(purchase.timestamp);

        self.buyers
            .entry(purchase.product_id.clone())
            .or_default()
            .insert(purchase.user_id.clone());
        self.user_products
            .entry(purchase.user_id.clone())
            .or_default()
            .insert(purchase.product_id.clone());
        self.user_purchases
            .entry(purchase.user_id.clone())
            .or_default()
            .push(purchase);
        self.version += 1;
    }

    /// Record an interest. Older records for the same value are kept.
    pub fn insert_interest(&mut self, mut interest: Interest) {
        interest.category = normalize_category(&interest.category);
        self.as_of = self.as_of.max(interest.created_at);
        self.user_interests
            .entry(interest.user_id.clone())
            .or_default()
            .push(interest);
        self.version += 1;
    }

    /// Get counts for debugging/validation: (users, products, purchases, interests)
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let purchases = self.user_purchases.values().map(|v| v.len()).sum();
        let interests = self.user_interests.values().map(|v| v.len()).sum();
        (self.users.len(), self.products.len(), purchases, interests)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}
