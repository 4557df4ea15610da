//! Recommender configuration.
//!
//! Loaded once from TOML, every field defaulted, validated before any
//! component sees it. A config that passes `validate` never fails later.
//!
//! ```toml
//! [scoring]
//! candidate_multiplier = 4
//! concurrency = 8
//! min_co_purchase_strength = 0.1
//! [scoring.weights]
//! purchase_affinity = 0.35
//! interest_match = 0.30
//! popularity = 0.20
//! recency = 0.15
//!
//! [ranking]
//! default_count = 10
//! max_count = 50
//! diversity_cap = 3
//! ```

use data_loader::DEFAULT_TRENDING_WINDOW_DAYS;
use pipeline::{ScoringWeights, WeightError};
use serde::{Deserialize, Serialize};
use sources::AggregationConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file `{path}`: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),

    #[error("invalid scoring weights: {0}")]
    InvalidWeights(#[from] WeightError),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Candidate pool size as a multiple of the requested count
    pub candidate_multiplier: usize,
    /// Concurrent feature lookups per request
    pub concurrency: usize,
    /// Co-purchase edges weaker than this produce no candidates
    pub min_co_purchase_strength: f32,
    /// Interests whose decayed confidence is below this produce no candidates
    pub min_interest_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            candidate_multiplier: 4,
            concurrency: pipeline::DEFAULT_CONCURRENCY,
            min_co_purchase_strength: 0.0,
            min_interest_weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    /// Used when a request asks for 0 results
    pub default_count: usize,
    /// Larger requests are capped to this
    pub max_count: usize,
    /// Per-category limit applied when a request does not set its own
    pub diversity_cap: Option<usize>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_count: 10,
            max_count: 50,
            diversity_cap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub half_life_days: f32,
    pub similar_users: usize,
    pub frequent_buyer_threshold: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        let aggregation = AggregationConfig::default();
        Self {
            half_life_days: aggregation.half_life_days,
            similar_users: 5,
            frequent_buyer_threshold: aggregation.frequent_buyer_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Deadline for every individual store call
    pub timeout_ms: u64,
    pub trending_window_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            trending_window_days: DEFAULT_TRENDING_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub recommendations_ttl_secs: u64,
    pub trending_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            recommendations_ttl_secs: 1_800,
            trending_ttl_secs: 7_200,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecommenderConfig {
    pub scoring: ScoringConfig,
    pub ranking: RankingConfig,
    pub profile: ProfileConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
}

impl RecommenderConfig {
    /// Load from `path` if given, otherwise use defaults.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
                }
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::ParseFile {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.weights.validate()?;

        if self.scoring.candidate_multiplier == 0 {
            return Err(invalid("scoring.candidate_multiplier must be at least 1"));
        }
        if self.scoring.concurrency == 0 {
            return Err(invalid("scoring.concurrency must be at least 1"));
        }
        for (name, value) in [
            ("scoring.min_co_purchase_strength", self.scoring.min_co_purchase_strength),
            ("scoring.min_interest_weight", self.scoring.min_interest_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.ranking.max_count == 0 {
            return Err(invalid("ranking.max_count must be at least 1"));
        }
        if self.ranking.default_count == 0 || self.ranking.default_count > self.ranking.max_count {
            return Err(invalid(format!(
                "ranking.default_count must be within 1..={}, got {}",
                self.ranking.max_count, self.ranking.default_count
            )));
        }
        if self.ranking.diversity_cap == Some(0) {
            return Err(invalid("ranking.diversity_cap must be at least 1 when set"));
        }
        if !self.profile.half_life_days.is_finite() || self.profile.half_life_days <= 0.0 {
            return Err(invalid(format!(
                "profile.half_life_days must be a positive number, got {}",
                self.profile.half_life_days
            )));
        }
        if self.profile.frequent_buyer_threshold == 0 {
            return Err(invalid("profile.frequent_buyer_threshold must be at least 1"));
        }
        if self.store.timeout_ms == 0 {
            return Err(invalid("store.timeout_ms must be at least 1"));
        }
        if self.store.trending_window_days == 0 {
            return Err(invalid("store.trending_window_days must be at least 1"));
        }
        if self.cache.recommendations_ttl_secs == 0 || self.cache.trending_ttl_secs == 0 {
            return Err(invalid("cache TTLs must be at least 1 second"));
        }
        Ok(())
    }

    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            half_life_days: self.profile.half_life_days,
            frequent_buyer_threshold: self.profile.frequent_buyer_threshold,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn recommendations_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.recommendations_ttl_secs)
    }

    pub fn trending_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.trending_ttl_secs)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}
