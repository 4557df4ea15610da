//! Builds a FeatureView from the store.
//!
//! The view gathers a user's purchases and interests once per request so the
//! sources and the scorer never query per-user data again.

use crate::types::{FeatureView, PurchaseRecord, WeightedInterest};
use data_loader::{
    Category, Interest, InterestSource, SECONDS_PER_DAY, StoreReader, StoreResult, Timestamp,
    category_matches,
};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Knobs for profile aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// Days after which an interest counts half as much
    pub half_life_days: f32,
    /// Purchases in one category needed to infer an interest in it
    pub frequent_buyer_threshold: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            frequent_buyer_threshold: 2,
        }
    }
}

/// Build the feature view for `user_id`.
///
/// Fails with `StoreError::NotFound` when the user does not exist.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn build_feature_view(
    store: &dyn StoreReader,
    user_id: &str,
    config: &AggregationConfig,
) -> StoreResult<FeatureView> {
    store.get_user(user_id).await?;

    let (snapshot, purchases, interests) = tokio::try_join!(
        store.snapshot(),
        store.purchases_for_user(user_id),
        store.interests_for_user(user_id),
    )?;

    let mut view = FeatureView::new(user_id);
    view.as_of = snapshot.as_of;

    for purchase in purchases {
        view.purchased.insert(purchase.product_id.clone());
        if !purchase.category.is_empty() {
            *view
                .category_counts
                .entry(purchase.category.clone())
                .or_insert(0) += 1;
        }
        view.purchases.push(PurchaseRecord {
            product_id: purchase.product_id,
            timestamp: purchase.timestamp,
            amount: purchase.amount,
            category: purchase.category,
        });
    }

    let mut weighted = latest_interests(&interests, snapshot.as_of, config.half_life_days);
    add_inferred_interests(&mut weighted, &view, config);

    weighted.sort_by(|a, b| {
        b.weighted_confidence
            .total_cmp(&a.weighted_confidence)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.value.cmp(&b.value))
    });
    view.interests = weighted;

    debug!(
        "Feature view: {} purchases, {} products, {} interests",
        view.purchases.len(),
        view.purchased.len(),
        view.interests.len()
    );
    Ok(view)
}

/// Keep the newest record per (category, value) and apply time decay.
fn latest_interests(
    interests: &[Interest],
    as_of: Timestamp,
    half_life_days: f32,
) -> Vec<WeightedInterest> {
    let mut newest: BTreeMap<(&str, &str), &Interest> = BTreeMap::new();
    for interest in interests {
        newest
            .entry((interest.category.as_str(), interest.value.as_str()))
            .and_modify(|current| {
                // Later records win timestamp ties
                if interest.created_at >= current.created_at {
                    *current = interest;
                }
            })
            .or_insert(interest);
    }

    newest
        .into_values()
        .map(|interest| WeightedInterest {
            category: interest.category.clone(),
            value: interest.value.clone(),
            confidence: interest.confidence,
            weighted_confidence: decay(interest.confidence, as_of - interest.created_at, half_life_days),
            source: interest.source,
            created_at: interest.created_at,
        })
        .collect()
}

/// confidence * 0.5^(age_days / half_life_days), age clamped at 0
pub fn decay(confidence: f32, age_secs: i64, half_life_days: f32) -> f32 {
    let confidence = confidence.clamp(0.0, 1.0);
    if half_life_days <= 0.0 || age_secs <= 0 {
        return confidence;
    }
    let age_days = age_secs as f64 / SECONDS_PER_DAY as f64;
    let factor = 0.5f64.powf(age_days / half_life_days as f64);
    (confidence as f64 * factor) as f32
}

/// Frequent purchases in a category imply interest in it.
fn add_inferred_interests(
    interests: &mut Vec<WeightedInterest>,
    view: &FeatureView,
    config: &AggregationConfig,
) {
    let inferred: Vec<WeightedInterest> = view
        .category_counts
        .iter()
        .filter(|(_, count)| **count >= config.frequent_buyer_threshold)
        .filter_map(|(category, count)| {
            let confidence = (0.1 * *count as f32).min(1.0);
            let value = frequent_buyer_value(category);

            let covered = interests.iter().any(|i| {
                (i.category == *category && i.value == value)
                    || (category_matches(&i.category, category)
                        && i.weighted_confidence >= confidence)
            });
            if covered {
                return None;
            }

            Some(WeightedInterest {
                category: category.clone(),
                value,
                confidence,
                weighted_confidence: confidence,
                source: InterestSource::InferredFromPurchase,
                created_at: view.as_of,
            })
        })
        .collect();

    interests.extend(inferred);
}

fn frequent_buyer_value(category: &Category) -> String {
    format!("frequent_buyer_{}", category)
}
