//! Filter implementations for the ranking stage.

pub mod already_purchased;
pub mod category;

pub use already_purchased::AlreadyPurchasedFilter;
pub use category::CategoryFilter;
