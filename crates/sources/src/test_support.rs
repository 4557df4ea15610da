//! Small in-memory catalogs for unit tests.

use crate::feature_view::{AggregationConfig, build_feature_view};
use crate::types::FeatureView;
use data_loader::{
    DataIndex, InMemoryStore, Interest, InterestSource, Metadata, Product, Purchase, StoreReader,
    User,
};
use std::sync::Arc;

pub struct TestCatalog {
    index: DataIndex,
    next_ts: i64,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self {
            index: DataIndex::new(),
            next_ts: 1_000,
        }
    }

    fn ensure_user(&mut self, user_id: &str) {
        if self.index.get_user(user_id).is_none() {
            self.index.insert_user(User {
                id: user_id.to_string(),
                email: format!("{user_id}@example.com"),
                profile: Metadata::new(),
                created_at: 0,
                updated_at: 0,
            });
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.ensure_user(user_id);
        self
    }

    pub fn product(mut self, id: &str, category: &str) -> Self {
        self.index.insert_product(Product {
            id: id.to_string(),
            name: id.to_uppercase(),
            category: category.to_string(),
            price: 10.0,
            description: String::new(),
            image_url: None,
            active: true,
            metadata: Metadata::new(),
        });
        self
    }

    pub fn inactive_product(mut self, id: &str, category: &str) -> Self {
        self = self.product(id, category);
        if let Some(product) = self.index.get_product(id).cloned() {
            self.index.insert_product(Product {
                active: false,
                ..product
            });
        }
        self
    }

    pub fn purchase(self, user_id: &str, product_id: &str) -> Self {
        self.purchase_amount(user_id, product_id, 10.0)
    }

    pub fn purchase_amount(mut self, user_id: &str, product_id: &str, amount: f64) -> Self {
        self.ensure_user(user_id);
        self.next_ts += 1;
        self.index.insert_purchase(Purchase {
            id: format!("o{}", self.next_ts),
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            amount,
            quantity: 1,
            category: String::new(),
            timestamp: self.next_ts,
            metadata: Metadata::new(),
        });
        self
    }

    pub fn interest(mut self, user_id: &str, category: &str, value: &str, confidence: f32) -> Self {
        self.ensure_user(user_id);
        self.next_ts += 1;
        self.index.insert_interest(Interest {
            id: format!("i{}", self.next_ts),
            user_id: user_id.to_string(),
            category: category.to_string(),
            value: value.to_string(),
            confidence,
            source: InterestSource::Explicit,
            created_at: self.next_ts,
        });
        self
    }

    pub fn store(mut self) -> Arc<dyn StoreReader> {
        self.index.recompute_relationships();
        Arc::new(InMemoryStore::new(Arc::new(self.index)))
    }
}

pub async fn view_for(store: &Arc<dyn StoreReader>, user_id: &str) -> FeatureView {
    build_feature_view(store.as_ref(), user_id, &AggregationConfig::default())
        .await
        .expect("user should exist")
}
