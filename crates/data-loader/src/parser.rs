//! Parser for the marketing dataset files.
//!
//! Each file holds one JSON object per line:
//! - users.jsonl: `{"id", "email", "profile", "created_at", "updated_at"}`
//! - products.jsonl: `{"id", "name", "category", "price", "active", ...}`
//! - purchases.jsonl: `{"id", "user_id", "product_id", "amount", "quantity", "timestamp", ...}`
//! - interests.jsonl: `{"id", "user_id", "category", "value", "confidence", "source", "created_at"}`
//!
//! Blank lines are skipped. Every record is validated as it is parsed so
//! errors point at the offending line.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Maximum length of an interest value
const MAX_INTEREST_VALUE_LEN: usize = 100;

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;
    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Parse every non-blank line of `path` as a `T`, checking each with `validate`.
fn parse_jsonl<T, F>(path: &Path, validate: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> std::result::Result<(), String>,
{
    let file = file_label(path);
    let lines = read_lines(path)?;
    let mut records = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(line_trimmed).map_err(|e| DataLoadError::ParseError {
            file: file.clone(),
            line: line_no,
            reason: e.to_string(),
        })?;

        validate(&record).map_err(|reason| DataLoadError::ParseError {
            file: file.clone(),
            line: line_no,
            reason,
        })?;

        records.push(record);
    }

    Ok(records)
}

fn validate_user(user: &User) -> std::result::Result<(), String> {
    if user.id.trim().is_empty() {
        return Err("Missing user id".to_string());
    }
    if !user.email.contains('@') || !user.email.contains('.') {
        return Err(format!("Invalid email: {}", user.email));
    }
    Ok(())
}

fn validate_product(product: &Product) -> std::result::Result<(), String> {
    if product.id.trim().is_empty() {
        return Err("Missing product id".to_string());
    }
    if product.category.trim().is_empty() {
        return Err(format!("Missing category for product {}", product.id));
    }
    if !(product.price > 0.0) {
        return Err(format!("Price must be greater than 0, got {}", product.price));
    }
    Ok(())
}

fn validate_purchase(purchase: &Purchase) -> std::result::Result<(), String> {
    if purchase.id.trim().is_empty() {
        return Err("Missing purchase id".to_string());
    }
    if !(purchase.amount > 0.0) {
        return Err(format!("Amount must be greater than 0, got {}", purchase.amount));
    }
    if purchase.quantity == 0 {
        return Err("Quantity must be at least 1".to_string());
    }
    Ok(())
}

fn validate_interest(interest: &Interest) -> std::result::Result<(), String> {
    if !(0.0..=1.0).contains(&interest.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            interest.confidence
        ));
    }
    let len = interest.value.chars().count();
    if len == 0 || len > MAX_INTEREST_VALUE_LEN {
        return Err(format!(
            "Interest value must be 1..={} characters",
            MAX_INTEREST_VALUE_LEN
        ));
    }
    if interest.category.trim().is_empty() {
        return Err("Missing interest category".to_string());
    }
    Ok(())
}

pub fn parse_users(path: &Path) -> Result<Vec<User>> {
    parse_jsonl(path, validate_user)
}

pub fn parse_products(path: &Path) -> Result<Vec<Product>> {
    parse_jsonl(path, validate_product)
}

pub fn parse_purchases(path: &Path) -> Result<Vec<Purchase>> {
    parse_jsonl(path, validate_purchase)
}

pub fn parse_interests(path: &Path) -> Result<Vec<Interest>> {
    parse_jsonl(path, validate_interest)
}
