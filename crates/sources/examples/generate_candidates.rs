//! Example: Generate candidates for a user
//!
//! Run with: cargo run --package sources --example generate_candidates
//!
//! This example shows how to:
//! 1. Load the sample catalog
//! 2. Build the user's feature view
//! 3. Run each candidate source on its own
//! 4. Generate the merged, validated pool

use data_loader::{DataIndex, InMemoryStore, StoreReader};
use sources::{
    AggregationConfig, CandidateGenerator, CoPurchaseSource, GenerateOptions, SharedInterestSource,
    SimilarUserSource, TrendingSource, build_feature_view,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("=== Candidate Generation Example ===\n");

    let start = Instant::now();
    let data_index = Arc::new(DataIndex::load_from_dir(Path::new("data/sample"))?);
    println!("Loaded catalog in {:?}\n", start.elapsed());
    let store: Arc<dyn StoreReader> = Arc::new(InMemoryStore::new(data_index.clone()));

    let user_id = "u001";
    let view = build_feature_view(store.as_ref(), user_id, &AggregationConfig::default()).await?;
    println!("Target user: {}", user_id);
    println!("  Purchases: {}", view.purchases.len());
    println!("  Top categories: {:?}", view.top_categories(3));
    for interest in &view.interests {
        println!(
            "  Interest {}/{}: {:.3}",
            interest.category, interest.value, interest.weighted_confidence
        );
    }
    println!();

    let co_purchase = CoPurchaseSource::new(store.clone())
        .get_candidates(&view, false)
        .await?;
    let similar = SimilarUserSource::new(store.clone())
        .get_candidates(&view, false)
        .await?;
    let interest = SharedInterestSource::new(store.clone())
        .get_candidates(&view, false)
        .await?;
    let trending = TrendingSource::new(store.clone())
        .get_candidates(&view, 10, false)
        .await?;
    println!(
        "Per source: co-purchase {}, similar users {}, shared interest {}, trending {}",
        co_purchase.len(),
        similar.len(),
        interest.len(),
        trending.len()
    );

    let start = Instant::now();
    let pool = CandidateGenerator::new(store.clone())
        .generate(&view, &GenerateOptions::new(20))
        .await?;
    println!("\nGenerated {} candidates in {:?}", pool.len(), start.elapsed());

    for (i, candidate) in pool.iter().take(10).enumerate() {
        let name = data_index
            .get_product(&candidate.product_id)
            .map(|p| p.name.as_str())
            .unwrap_or("<unknown>");
        let sources: Vec<&str> = candidate.metadata.sources.iter().map(|s| s.as_str()).collect();
        println!(
            "  {}. {} [{}] base {:.3} via {}",
            i + 1,
            name,
            candidate.category,
            candidate.base_score,
            sources.join(", ")
        );
    }

    Ok(())
}
