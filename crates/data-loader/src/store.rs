//! Read access to the catalog at request time.
//!
//! The recommendation core only ever talks to data through `StoreReader`.
//! `InMemoryStore` serves a loaded `DataIndex`; `TimeoutStore` bounds every
//! call of another store so a slow backend surfaces as `StoreError::Timeout`.

use crate::error::{StoreError, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Version and logical "now" of the data being served
    async fn snapshot(&self) -> StoreResult<CatalogSnapshot>;

    async fn get_user(&self, user_id: &str) -> StoreResult<User>;

    async fn purchases_for_user(&self, user_id: &str) -> StoreResult<Vec<Purchase>>;

    async fn interests_for_user(&self, user_id: &str) -> StoreResult<Vec<Interest>>;

    /// Batched product lookup. Unknown ids are skipped, order follows `ids`.
    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>>;

    async fn product_stats(&self, product_id: &str) -> StoreResult<ProductStats>;

    /// Co-purchase edges out of a product, strongest first
    async fn co_purchased_with(&self, product_id: &str) -> StoreResult<Vec<WeightedEdge>>;

    async fn similar_users(&self, user_id: &str, limit: usize) -> StoreResult<Vec<WeightedEdge>>;

    async fn purchased_products(&self, user_id: &str) -> StoreResult<Vec<ProductId>>;

    async fn products_in_category(&self, category: &str) -> StoreResult<Vec<ProductId>>;

    async fn trending_products(&self, limit: usize) -> StoreResult<Vec<ProductId>>;

    /// Active products by purchase popularity, then recency, then id.
    ///
    /// With a category only that category and its aliases are returned.
    async fn popular_products(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ProductId>>;
}

/// `StoreReader` over an immutable, shared `DataIndex`
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    data_index: Arc<DataIndex>,
}

impl InMemoryStore {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }
}

#[async_trait]
impl StoreReader for InMemoryStore {
    async fn snapshot(&self) -> StoreResult<CatalogSnapshot> {
        Ok(self.data_index.snapshot())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        self.data_index
            .get_user(user_id)
            .cloned()
            .ok_or_else(|| StoreError::user_not_found(user_id))
    }

    async fn purchases_for_user(&self, user_id: &str) -> StoreResult<Vec<Purchase>> {
        Ok(self.data_index.get_user_purchases(user_id).to_vec())
    }

    async fn interests_for_user(&self, user_id: &str) -> StoreResult<Vec<Interest>> {
        Ok(self.data_index.get_user_interests(user_id).to_vec())
    }

    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.data_index.get_product(id).cloned())
            .collect())
    }

    async fn product_stats(&self, product_id: &str) -> StoreResult<ProductStats> {
        if self.data_index.get_product(product_id).is_none() {
            return Err(StoreError::product_not_found(product_id));
        }
        Ok(self
            .data_index
            .get_product_stats(product_id)
            .copied()
            .unwrap_or_default())
    }

    async fn co_purchased_with(&self, product_id: &str) -> StoreResult<Vec<WeightedEdge>> {
        Ok(self.data_index.get_co_purchases(product_id).to_vec())
    }

    async fn similar_users(&self, user_id: &str, limit: usize) -> StoreResult<Vec<WeightedEdge>> {
        Ok(self.data_index.similar_users(user_id, limit))
    }

    async fn purchased_products(&self, user_id: &str) -> StoreResult<Vec<ProductId>> {
        Ok(self
            .data_index
            .get_user_products(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn products_in_category(&self, category: &str) -> StoreResult<Vec<ProductId>> {
        Ok(self.data_index.get_products_by_category(category).to_vec())
    }

    async fn trending_products(&self, limit: usize) -> StoreResult<Vec<ProductId>> {
        Ok(self
            .data_index
            .get_trending()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn popular_products(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ProductId>> {
        Ok(match category {
            Some(category) => self.data_index.popular_in_category(category, limit),
            None => self
                .data_index
                .get_popular()
                .iter()
                .take(limit)
                .cloned()
                .collect(),
        })
    }
}

/// Applies a per-call deadline to every method of the wrapped store
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: StoreReader> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        T: Send,
        F: Future<Output = StoreResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<S: StoreReader> StoreReader for TimeoutStore<S> {
    async fn snapshot(&self) -> StoreResult<CatalogSnapshot> {
        self.bounded("snapshot", self.inner.snapshot()).await
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        self.bounded("get_user", self.inner.get_user(user_id)).await
    }

    async fn purchases_for_user(&self, user_id: &str) -> StoreResult<Vec<Purchase>> {
        self.bounded("purchases_for_user", self.inner.purchases_for_user(user_id))
            .await
    }

    async fn interests_for_user(&self, user_id: &str) -> StoreResult<Vec<Interest>> {
        self.bounded("interests_for_user", self.inner.interests_for_user(user_id))
            .await
    }

    async fn get_products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        self.bounded("get_products", self.inner.get_products(ids)).await
    }

    async fn product_stats(&self, product_id: &str) -> StoreResult<ProductStats> {
        self.bounded("product_stats", self.inner.product_stats(product_id))
            .await
    }

    async fn co_purchased_with(&self, product_id: &str) -> StoreResult<Vec<WeightedEdge>> {
        self.bounded("co_purchased_with", self.inner.co_purchased_with(product_id))
            .await
    }

    async fn similar_users(&self, user_id: &str, limit: usize) -> StoreResult<Vec<WeightedEdge>> {
        self.bounded("similar_users", self.inner.similar_users(user_id, limit))
            .await
    }

    async fn purchased_products(&self, user_id: &str) -> StoreResult<Vec<ProductId>> {
        self.bounded("purchased_products", self.inner.purchased_products(user_id))
            .await
    }

    async fn products_in_category(&self, category: &str) -> StoreResult<Vec<ProductId>> {
        self.bounded(
            "products_in_category",
            self.inner.products_in_category(category),
        )
        .await
    }

    async fn trending_products(&self, limit: usize) -> StoreResult<Vec<ProductId>> {
        self.bounded("trending_products", self.inner.trending_products(limit))
            .await
    }

    async fn popular_products(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ProductId>> {
        self.bounded(
            "popular_products",
            self.inner.popular_products(category, limit),
        )
        .await
    }
}
