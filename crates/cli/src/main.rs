use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{DataIndex, InMemoryStore, UserId};
use rand::seq::IndexedRandom;
use server::{
    InteractionKind, RecommendOptions, Recommendation, RecommendationOrchestrator,
    RecommenderConfig,
};
use sources::build_feature_view;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// market-recs - Product Recommendation Engine
#[derive(Parser)]
#[command(name = "market-recs")]
#[command(about = "Personalized product recommendations from purchase history and interests", long_about = None)]
struct Cli {
    /// Directory holding users, products, purchases and interests as JSONL
    #[arg(short, long, default_value = "data/sample")]
    data_dir: PathBuf,

    /// Recommender configuration (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get product recommendations for a user
    Recommend {
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations (0 = configured default)
        #[arg(long, default_value = "10")]
        count: usize,

        /// Only recommend products in this category
        #[arg(long)]
        category: Option<String>,

        /// Allow products the user already bought
        #[arg(long)]
        repurchase: bool,

        /// Maximum results per category
        #[arg(long)]
        diversity_cap: Option<usize>,

        /// Show sub-scores and candidate sources
        #[arg(long)]
        explain: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Products bought by shoppers with similar purchase histories
    Similar {
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations (0 = configured default)
        #[arg(long, default_value = "10")]
        count: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show a user's profile, purchases and weighted interests
    User {
        #[arg(long)]
        user_id: UserId,
    },

    /// Show the most popular products right now
    Trending {
        #[arg(long, default_value = "10")]
        count: usize,

        #[arg(long)]
        json: bool,
    },

    /// Record a user action on a product
    Interact {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        product_id: String,

        #[arg(long, value_enum, default_value = "view")]
        kind: Kind,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },

    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    View,
    Click,
    Purchase,
}

impl From<Kind> for InteractionKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::View => InteractionKind::View,
            Kind::Click => InteractionKind::Click,
            Kind::Purchase => InteractionKind::Purchase,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = RecommenderConfig::load(cli.config.as_deref())
        .context("Failed to load recommender configuration")?;

    match cli.command {
        Commands::CheckConfig => handle_check_config(&config),
        command => {
            let data_index = Arc::new(load_catalog(&cli.data_dir, &config)?);
            run(command, data_index, config).await
        }
    }
}

/// Dispatch to the appropriate command handler
async fn run(command: Commands, data_index: Arc<DataIndex>, config: RecommenderConfig) -> Result<()> {
    match command {
        Commands::Recommend {
            user_id,
            count,
            category,
            repurchase,
            diversity_cap,
            explain,
            json,
        } => {
            let options = RecommendOptions {
                category,
                repurchase,
                diversity_cap,
            };
            handle_recommend(data_index, config, &user_id, count, &options, explain, json).await
        }
        Commands::Similar {
            user_id,
            count,
            json,
        } => handle_similar(data_index, config, &user_id, count, json).await,
        Commands::User { user_id } => handle_user(data_index, &config, &user_id).await,
        Commands::Trending { count, json } => handle_trending(data_index, config, count, json).await,
        Commands::Interact {
            user_id,
            product_id,
            kind,
        } => handle_interact(data_index, config, &user_id, &product_id, kind.into()).await,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(data_index, config, requests, concurrent).await,
        Commands::CheckConfig => handle_check_config(&config),
    }
}

fn load_catalog(data_dir: &Path, config: &RecommenderConfig) -> Result<DataIndex> {
    println!("Loading catalog from {}...", data_dir.display());
    let start = Instant::now();
    let data_index = DataIndex::load_from_dir_with_window(data_dir, config.store.trending_window_days)
        .context("Failed to load catalog")?;

    let (users, products, purchases, interests) = data_index.counts();
    println!(
        "{} Loaded {} users, {} products, {} purchases, {} interests in {:?}",
        "✓".green(),
        users,
        products,
        purchases,
        interests,
        start.elapsed()
    );
    Ok(data_index)
}

/// Handle the 'recommend' command
async fn handle_recommend(
    data_index: Arc<DataIndex>,
    config: RecommenderConfig,
    user_id: &str,
    count: usize,
    options: &RecommendOptions,
    explain: bool,
    json: bool,
) -> Result<()> {
    let orchestrator = RecommendationOrchestrator::from_index(data_index, config)?;
    let recommendations = orchestrator
        .recommend(user_id, count, options)
        .await
        .with_context(|| format!("Failed to recommend for user {user_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
    } else {
        print_recommendations(
            &format!("Recommendations for {user_id}"),
            &recommendations,
            explain,
        );
    }
    Ok(())
}

/// Handle the 'similar' command
async fn handle_similar(
    data_index: Arc<DataIndex>,
    config: RecommenderConfig,
    user_id: &str,
    count: usize,
    json: bool,
) -> Result<()> {
    let orchestrator = RecommendationOrchestrator::from_index(data_index, config)?;
    let recommendations = orchestrator
        .similar_user_recommendations(user_id, count)
        .await
        .with_context(|| format!("Failed to find similar shoppers for user {user_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
    } else {
        print_recommendations(
            &format!("Shoppers like {user_id} also bought"),
            &recommendations,
            false,
        );
    }
    Ok(())
}

/// Handle the 'user' command
async fn handle_user(data_index: Arc<DataIndex>, config: &RecommenderConfig, user_id: &str) -> Result<()> {
    let user = data_index
        .get_user(user_id)
        .ok_or_else(|| anyhow!("User {} not found", user_id))?
        .clone();

    let store = InMemoryStore::new(data_index.clone());
    let view = build_feature_view(&store, user_id, &config.aggregation()).await?;

    println!("{}", format!("User {}", user.id).bold().blue());
    println!("{}Email: {}", "• ".green(), user.email);
    println!("{}Purchases: {}", "• ".green(), view.purchases.len());
    let spent: f64 = view.purchases.iter().map(|p| p.amount).sum();
    println!("{}Total spent: {:.2}", "• ".green(), spent);

    println!("Top categories:");
    for (category, count) in view.top_categories(5) {
        println!("  - {} ({} purchases)", category, count);
    }

    println!("Recent purchases:");
    for purchase in view.purchases.iter().rev().take(5) {
        let name = data_index
            .get_product(&purchase.product_id)
            .map(|p| p.name.as_str())
            .unwrap_or("<unknown>");
        println!("  - {} [{}] {:.2}", name, purchase.category, purchase.amount);
    }

    println!("Interests (decayed):");
    for interest in &view.interests {
        println!(
            "  - {}/{}: {:.2} (raw {:.2}, {:?})",
            interest.category,
            interest.value,
            interest.weighted_confidence,
            interest.confidence,
            interest.source
        );
    }
    Ok(())
}

/// Handle the 'trending' command
async fn handle_trending(
    data_index: Arc<DataIndex>,
    config: RecommenderConfig,
    count: usize,
    json: bool,
) -> Result<()> {
    let orchestrator = RecommendationOrchestrator::from_index(data_index, config)?;
    let trending = orchestrator.trending(count).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trending)?);
    } else {
        print_recommendations("Trending products", &trending, false);
    }
    Ok(())
}

/// Handle the 'interact' command
async fn handle_interact(
    data_index: Arc<DataIndex>,
    config: RecommenderConfig,
    user_id: &str,
    product_id: &str,
    kind: InteractionKind,
) -> Result<()> {
    let orchestrator = RecommendationOrchestrator::from_index(data_index, config)?;
    orchestrator
        .record_interaction(user_id, product_id, kind)
        .await
        .with_context(|| format!("Failed to record {kind} of {product_id} by {user_id}"))?;

    println!("{} Recorded {} of {} by {}", "✓".green(), kind, product_id, user_id);
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    data_index: Arc<DataIndex>,
    config: RecommenderConfig,
    requests: usize,
    concurrent: usize,
) -> Result<()> {
    if requests == 0 {
        return Err(anyhow!("Benchmark needs at least one request"));
    }

    let all_users = data_index.get_all_user_ids();
    let orchestrator = RecommendationOrchestrator::from_index(data_index, config)?;

    let mut rng = rand::rng();
    let user_ids: Vec<UserId> = (0..requests)
        .map(|_| all_users.choose(&mut rng).cloned())
        .collect::<Option<_>>()
        .ok_or_else(|| anyhow!("Catalog has no users to benchmark"))?;

    let semaphore = Arc::new(Semaphore::new(concurrent.max(1)));
    let started = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for user in user_ids {
        let orchestrator = orchestrator.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let start = Instant::now();
            orchestrator
                .recommend(&user, 0, &RecommendOptions::default())
                .await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings: Vec<Duration> = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let wall_time = started.elapsed();

    let total: Duration = timings.iter().sum();
    let avg_latency = total / timings.len() as u32;
    timings.sort();
    let percentile = |p: f64| timings[((timings.len() - 1) as f64 * p).round() as usize];
    let stats = orchestrator.cache_stats();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", requests, concurrent.max(1));
    println!("Wall time: {:?}", wall_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!(
        "Throughput: {:.2} requests/second",
        requests as f64 / wall_time.as_secs_f64()
    );
    println!(
        "Cache: {} hits, {} misses, {} collapsed ({:.1}% hit rate)",
        stats.hits,
        stats.misses,
        stats.collapsed,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

/// Handle the 'check-config' command
fn handle_check_config(config: &RecommenderConfig) -> Result<()> {
    println!("{} Configuration is valid", "✓".green());
    let weights = &config.scoring.weights;
    println!(
        "Weights: affinity {:.2}, interest {:.2}, popularity {:.2}, recency {:.2}",
        weights.purchase_affinity, weights.interest_match, weights.popularity, weights.recency
    );
    println!(
        "Counts: default {}, max {}, candidates x{}",
        config.ranking.default_count, config.ranking.max_count, config.scoring.candidate_multiplier
    );
    println!(
        "Source thresholds: co-purchase strength {:.2}, interest weight {:.2}",
        config.scoring.min_co_purchase_strength, config.scoring.min_interest_weight
    );
    match config.ranking.diversity_cap {
        Some(cap) => println!("Diversity cap: {} per category", cap),
        None => println!("Diversity cap: none"),
    }
    println!(
        "Interest half-life: {} days, trending window: {} days",
        config.profile.half_life_days, config.store.trending_window_days
    );
    println!(
        "Store timeout: {:?}, cache TTL: {:?} (trending {:?})",
        config.store_timeout(),
        config.recommendations_ttl(),
        config.trending_ttl()
    );
    Ok(())
}

fn print_recommendations(title: &str, recommendations: &[Recommendation], explain: bool) {
    println!("{}", title.bold().blue());
    if recommendations.is_empty() {
        println!("  (nothing to recommend)");
        return;
    }

    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. {} [{}] {:.2} - Score: {:.3} ({})",
            (rank + 1).to_string().green(),
            rec.name,
            rec.category,
            rec.price,
            rec.score,
            rec.reason.to_string().cyan()
        );
        if explain {
            let sources: Vec<&str> = rec.sources.iter().map(|s| s.as_str()).collect();
            println!(
                "   affinity {:.2}, interest {:.2}, popularity {:.2}, recency {:.2} via {}",
                rec.sub_scores.purchase_affinity,
                rec.sub_scores.interest_match,
                rec.sub_scores.popularity,
                rec.sub_scores.recency,
                sources.join(", ")
            );
        }
    }
}
