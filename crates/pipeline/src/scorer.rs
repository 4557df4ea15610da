//! Weighted linear scoring of candidates.
//!
//! ```text
//! purchase_affinity = max(co_purchase_strength, similar_user_strength)
//! interest_match    = best decayed interest matching the product category
//! popularity        = stats.popularity
//! recency_boost     = stats.recency
//! score             = Σ weight_i * sub_score_i
//! ```
//!
//! Scoring is pure: the same candidate, features and view always produce the
//! same score and reason.

use crate::features::CandidateFeatures;
use data_loader::{Category, ProductId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sources::{Candidate, CandidateSource, FeatureView};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Allowed drift of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("weight {name} must be a finite number >= 0, got {value}")]
    Invalid { name: &'static str, value: f32 },

    #[error("weights must sum to 1.0, got {sum}")]
    BadSum { sum: f32 },
}

/// Relative importance of each sub-score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub purchase_affinity: f32,
    pub interest_match: f32,
    pub popularity: f32,
    pub recency: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            purchase_affinity: 0.35,
            interest_match: 0.30,
            popularity: 0.20,
            recency: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), WeightError> {
        let named = [
            ("purchase_affinity", self.purchase_affinity),
            ("interest_match", self.interest_match),
            ("popularity", self.popularity),
            ("recency", self.recency),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightError::Invalid { name, value });
            }
        }

        let sum: f32 = named.iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(WeightError::BadSum { sum });
        }
        Ok(())
    }
}

/// Why a product was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    CoPurchase,
    SimilarUser,
    InterestMatch,
    Trending,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::CoPurchase => "co_purchase",
            Reason::SimilarUser => "similar_user",
            Reason::InterestMatch => "interest_match",
            Reason::Trending => "trending",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CandidateSource> for Reason {
    fn from(source: CandidateSource) -> Self {
        match source {
            CandidateSource::CoPurchase => Reason::CoPurchase,
            CandidateSource::SimilarUser => Reason::SimilarUser,
            CandidateSource::SharedInterest => Reason::InterestMatch,
            CandidateSource::Trending => Reason::Trending,
        }
    }
}

/// Unweighted sub-scores, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub purchase_affinity: f32,
    pub interest_match: f32,
    pub popularity: f32,
    pub recency: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub product_id: ProductId,
    pub category: Category,
    pub score: f32,
    pub reason: Reason,
    pub sub_scores: SubScores,
    pub sources: BTreeSet<CandidateSource>,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Result<Self, WeightError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn score(
        &self,
        candidate: &Candidate,
        features: &CandidateFeatures,
        view: &FeatureView,
    ) -> ScoredCandidate {
        let co_purchase = unit(candidate.metadata.co_purchase_strength.unwrap_or(0.0));
        let similar_user = unit(candidate.metadata.similar_user_strength.unwrap_or(0.0));

        let sub_scores = SubScores {
            purchase_affinity: co_purchase.max(similar_user),
            interest_match: unit(
                view.best_interest_for(&candidate.category)
                    .map(|i| i.weighted_confidence)
                    .unwrap_or(0.0),
            ),
            popularity: unit(features.stats.popularity),
            recency: unit(features.stats.recency),
        };

        let w = &self.weights;
        let affinity = w.purchase_affinity * sub_scores.purchase_affinity;
        let interest = w.interest_match * sub_scores.interest_match;
        let trending = (w.popularity * sub_scores.popularity).max(w.recency * sub_scores.recency);
        let score = affinity
            + interest
            + w.popularity * sub_scores.popularity
            + w.recency * sub_scores.recency;

        let affinity_reason = if co_purchase >= similar_user {
            Reason::CoPurchase
        } else {
            Reason::SimilarUser
        };

        // Earlier entries win ties
        let contributions = [
            (affinity_reason, affinity),
            (Reason::InterestMatch, interest),
            (Reason::Trending, trending),
        ];
        let reason = if contributions.iter().all(|(_, c)| *c <= 0.0) {
            Reason::from(candidate.source)
        } else {
            contributions
                .iter()
                .fold((affinity_reason, f32::NEG_INFINITY), |best, &(reason, c)| {
                    if c > best.1 { (reason, c) } else { best }
                })
                .0
        };

        ScoredCandidate {
            product_id: candidate.product_id.clone(),
            category: candidate.category.clone(),
            score: score.max(0.0),
            reason,
            sub_scores,
            sources: candidate.metadata.sources.clone(),
        }
    }

    /// Score candidates in parallel; `features` must line up with `candidates`.
    pub fn score_all(
        &self,
        candidates: &[Candidate],
        features: &[CandidateFeatures],
        view: &FeatureView,
    ) -> Vec<ScoredCandidate> {
        debug_assert_eq!(candidates.len(), features.len());

        let scored: Vec<ScoredCandidate> = candidates
            .par_iter()
            .zip(features.par_iter())
            .map(|(candidate, features)| self.score(candidate, features, view))
            .collect();

        debug!("Scored {} candidates", scored.len());
        scored
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
