//! DataIndex building and relationship derivation.
//!
//! Loading parses the four dataset files in parallel, inserts the facts, then
//! derives every relationship in one pass:
//! - co-purchase edges between products
//! - per-product purchase statistics
//! - the trending and popularity orders
//!
//! Derivation is a pure function of the recorded facts, so running it twice
//! yields the same indices.

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

impl DataIndex {
    /// Load the dataset from a directory containing the four `.jsonl` files.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        Self::load_from_dir_with_window(data_dir, DEFAULT_TRENDING_WINDOW_DAYS)
    }

    /// Same as `load_from_dir` with an explicit trending window.
    pub fn load_from_dir_with_window(data_dir: &Path, trending_window_days: u32) -> Result<Self> {
        info!("Loading marketing dataset from {:?}", data_dir);

        let users_path = data_dir.join("users.jsonl");
        let products_path = data_dir.join("products.jsonl");
        let purchases_path = data_dir.join("purchases.jsonl");
        let interests_path = data_dir.join("interests.jsonl");

        let ((users, products), (purchases, interests)) = rayon::join(
            || {
                rayon::join(
                    || parser::parse_users(&users_path),
                    || parser::parse_products(&products_path),
                )
            },
            || {
                rayon::join(
                    || parser::parse_purchases(&purchases_path),
                    || parser::parse_interests(&interests_path),
                )
            },
        );

        let users = users?;
        let products = products?;
        let purchases = purchases?;
        let interests = interests?;

        info!(
            "Parsed {} users, {} products, {} purchases, {} interests",
            users.len(),
            products.len(),
            purchases.len(),
            interests.len()
        );

        let mut index = DataIndex::new().with_trending_window_days(trending_window_days);

        for user in users {
            index.insert_user(user);
        }
        // Products before purchases so purchases can inherit their category
        for product in products {
            index.insert_product(product);
        }
        for purchase in purchases {
            index.insert_purchase(purchase);
        }
        for interest in interests {
            index.insert_interest(interest);
        }

        index.validate()?;
        index.recompute_relationships();

        info!("DataIndex built and validated (version {})", index.version);
        Ok(index)
    }

    /// Rebuild co-purchase edges, product statistics and both product orders.
    pub fn recompute_relationships(&mut self) {
        self.co_purchase = self.compute_co_purchase_edges();
        self.product_stats = self.compute_product_stats();
        self.trending = self.compute_trending();
        self.popular = self.compute_popular();
        self.version += 1;

        debug!(
            "Recomputed relationships: {} products with co-purchase edges, {} trending",
            self.co_purchase.len(),
            self.trending.len()
        );
    }

    /// strength(p, c) = |buyers(p) ∩ buyers(c)| / |buyers(p)|
    fn compute_co_purchase_edges(&self) -> HashMap<ProductId, Vec<WeightedEdge>> {
        self.buyers
            .par_iter()
            .map(|(product_id, buyers)| {
                let mut counts: HashMap<&ProductId, u32> = HashMap::new();
                for buyer in buyers {
                    if let Some(products) = self.user_products.get(buyer) {
                        for other in products {
                            if other != product_id {
                                *counts.entry(other).or_insert(0) += 1;
                            }
                        }
                    }
                }

                let denominator = buyers.len().max(1) as f32;
                let mut edges: Vec<WeightedEdge> = counts
                    .into_iter()
                    .map(|(target, count)| WeightedEdge {
                        target: target.clone(),
                        strength: count as f32 / denominator,
                        count,
                    })
                    .collect();
                edges.sort_by(compare_edges);

                (product_id.clone(), edges)
            })
            .filter(|(_, edges)| !edges.is_empty())
            .collect()
    }

    fn compute_product_stats(&self) -> HashMap<ProductId, ProductStats> {
        let window = self.trending_window_days as i64 * SECONDS_PER_DAY;
        let cutoff = self.as_of - window;

        let mut stats: HashMap<ProductId, ProductStats> = self
            .products
            .keys()
            .map(|id| (id.clone(), ProductStats::default()))
            .collect();

        for purchases in self.user_purchases.values() {
            for purchase in purchases {
                let entry = stats.entry(purchase.product_id.clone()).or_default();
                entry.purchase_count += 1;
                entry.total_revenue += purchase.amount;
                if purchase.timestamp > cutoff {
                    entry.recent_purchase_count += 1;
                    entry.recent_revenue += purchase.amount;
                }
            }
        }

        let max_count = stats.values().map(|s| s.purchase_count).max().unwrap_or(0);
        let max_recent = stats
            .values()
            .map(|s| s.recent_purchase_count)
            .max()
            .unwrap_or(0);

        stats.par_iter_mut().for_each(|(_, s)| {
            s.popularity = normalize(s.purchase_count, max_count);
            s.recency = normalize(s.recent_purchase_count, max_recent);
            s.trend_score = compute_trend_score(s.recent_purchase_count, s.recent_revenue);
        });

        stats
    }

    fn compute_trending(&self) -> Vec<ProductId> {
        self.order_active(|a, b| {
            b.trend_score
                .total_cmp(&a.trend_score)
                .then_with(|| b.popularity.total_cmp(&a.popularity))
        })
    }

    /// Purchase count order, independent of revenue
    fn compute_popular(&self) -> Vec<ProductId> {
        self.order_active(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| b.recency.total_cmp(&a.recency))
        })
    }

    /// Active product ids sorted by `compare` on their stats, ties by id
    fn order_active<F>(&self, compare: F) -> Vec<ProductId>
    where
        F: Fn(&ProductStats, &ProductStats) -> Ordering,
    {
        let mut active: Vec<(&ProductId, ProductStats)> = self
            .products
            .values()
            .filter(|p| p.active)
            .map(|p| {
                let stats = self.product_stats.get(&p.id).copied().unwrap_or_default();
                (&p.id, stats)
            })
            .collect();

        active.sort_by(|(a_id, a), (b_id, b)| compare(a, b).then_with(|| a_id.cmp(b_id)));

        active.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Users whose purchase sets overlap with `user_id`, by Jaccard similarity.
    ///
    /// Ordered by similarity desc, then user id asc.
    pub fn similar_users(&self, user_id: &str, limit: usize) -> Vec<WeightedEdge> {
        let Some(own) = self.user_products.get(user_id) else {
            return Vec::new();
        };

        let shared_counts = own
            .par_iter()
            .fold(HashMap::new, |mut local: HashMap<&UserId, u32>, product_id| {
                if let Some(buyers) = self.buyers.get(product_id) {
                    for buyer in buyers {
                        if buyer != user_id {
                            *local.entry(buyer).or_insert(0) += 1;
                        }
                    }
                }
                local
            })
            .reduce(HashMap::new, |mut acc, local| {
                for (buyer, count) in local {
                    *acc.entry(buyer).or_insert(0) += count;
                }
                acc
            });

        let mut similar: Vec<WeightedEdge> = shared_counts
            .into_iter()
            .map(|(other, common)| {
                let other_len = self.user_products.get(other).map(BTreeSet::len).unwrap_or(0);
                let union = own.len() + other_len - common as usize;
                WeightedEdge {
                    target: other.clone(),
                    strength: common as f32 / union.max(1) as f32,
                    count: common,
                }
            })
            .collect();

        similar.sort_by(compare_edges);
        similar.truncate(limit);
        similar
    }

    /// Check referential integrity and value ranges.
    pub fn validate(&self) -> Result<()> {
        for purchases in self.user_purchases.values() {
            for purchase in purchases {
                if !self.users.contains_key(&purchase.user_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "User".to_string(),
                        id: purchase.user_id.clone(),
                    });
                }
                if !self.products.contains_key(&purchase.product_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Product".to_string(),
                        id: purchase.product_id.clone(),
                    });
                }
                if !(purchase.amount > 0.0) {
                    return Err(DataLoadError::InvalidValue {
                        field: "amount".to_string(),
                        value: purchase.amount.to_string(),
                    });
                }
            }
        }

        for interests in self.user_interests.values() {
            for interest in interests {
                if !self.users.contains_key(&interest.user_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "User".to_string(),
                        id: interest.user_id.clone(),
                    });
                }
                if !(0.0..=1.0).contains(&interest.confidence) {
                    return Err(DataLoadError::InvalidValue {
                        field: "confidence".to_string(),
                        value: interest.confidence.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Strongest first, then by target id so equal strengths order stably
fn compare_edges(a: &WeightedEdge, b: &WeightedEdge) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then_with(|| b.count.cmp(&a.count))
        .then_with(|| a.target.cmp(&b.target))
}

fn normalize(value: u32, max: u32) -> f32 {
    if max == 0 {
        0.0
    } else {
        value as f32 / max as f32
    }
}

/// Recent purchase volume weighted with recent revenue
fn compute_trend_score(recent_count: u32, recent_revenue: f64) -> f64 {
    recent_count as f64 * 0.7 + recent_revenue * 0.3
}
