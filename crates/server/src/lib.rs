//! Server crate for the market recommendation engine.
//!
//! This crate wires the pipeline into a request-serving core: configuration,
//! result caching, request collapsing and the orchestrator that ties them
//! together.

pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod single_flight;

pub use cache::{Cache, CacheError, MemoryCache};
pub use config::{ConfigError, RecommenderConfig};
pub use error::RecommendError;
pub use orchestrator::{
    CacheStats, InteractionKind, RecommendOptions, Recommendation, RecommendationOrchestrator,
};
pub use single_flight::{FlightRole, SingleFlight};
