use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::product::{ProductId, StockAdjustment};

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One `{id, quantity}` entry of an incoming order request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedProduct {
    pub id: ProductId,
    pub quantity: i32,
}

impl RequestedProduct {
    pub fn new(id: impl Into<ProductId>, quantity: i32) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }
}

/// Input of the order creation workflow.
///
/// Entries are kept in the order the caller sent them; repeated product ids
/// are not merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: CustomerId,
    pub products: Vec<RequestedProduct>,
}

impl OrderRequest {
    pub fn new(customer_id: impl Into<CustomerId>, products: Vec<RequestedProduct>) -> Self {
        Self {
            customer_id: customer_id.into(),
            products,
        }
    }

    /// Distinct product ids, first occurrence first
    pub fn distinct_product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::with_capacity(self.products.len());
        for product in &self.products {
            if !ids.contains(&product.id) {
                ids.push(product.id.clone());
            }
        }
        ids
    }

    pub fn stock_adjustments(&self) -> Vec<StockAdjustment> {
        self.products
            .iter()
            .map(|p| StockAdjustment::new(p.id.clone(), p.quantity))
            .collect()
    }
}

/// Product, quantity and unit price fixed at the moment the order is placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: f64,
}

impl OrderLineItem {
    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// A persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: Customer,
    pub products: Vec<OrderLineItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> f64 {
        self.products.iter().map(OrderLineItem::subtotal).sum()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
