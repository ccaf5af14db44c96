use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Product Value Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A product in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    /// Units currently in stock
    pub quantity: i32,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: f64, quantity: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity,
        }
    }

    pub fn has_stock_for(&self, requested: i32) -> bool {
        self.quantity >= requested
    }
}

/// Amount of stock to take off a single product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub id: ProductId,
    pub quantity: i32,
}

impl StockAdjustment {
    pub fn new(id: impl Into<ProductId>, quantity: i32) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }
}
