//! # Data Loader Crate
//!
//! Loads and indexes the marketing dataset (users, products, purchases and
//! interests) and exposes it to the recommendation core through the
//! `StoreReader` seam.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (User, Product, Purchase, Interest, DataIndex)
//! - **parser**: Parse `.jsonl` files into Rust structs
//! - **index**: Build indices and derive relationship edges
//! - **store**: `StoreReader` trait, in-memory and timeout-bounded stores
//! - **error**: Error types for loading and store access
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{DataIndex, InMemoryStore, StoreReader};
//! use std::{path::Path, sync::Arc};
//!
//! let index = DataIndex::load_from_dir(Path::new("data/sample"))?;
//! let store = InMemoryStore::new(Arc::new(index));
//!
//! let purchases = store.purchases_for_user("u1").await?;
//! println!("u1 made {} purchases", purchases.len());
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod store;
pub mod types;

pub use error::{DataLoadError, Result, StoreError, StoreResult};
pub use store::{InMemoryStore, StoreReader, TimeoutStore};
pub use types::{
    // Type aliases
    Category,
    Metadata,
    ProductId,
    Timestamp,
    UserId,
    // Core types
    CatalogSnapshot,
    DataIndex,
    Interest,
    InterestSource,
    Product,
    ProductStats,
    Purchase,
    User,
    WeightedEdge,
    // Category helpers
    category_matches,
    equivalent_categories,
    normalize_category,
    // Constants
    DEFAULT_TRENDING_WINDOW_DAYS,
    SECONDS_PER_DAY,
};
