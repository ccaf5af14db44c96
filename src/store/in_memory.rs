use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::order::{Order, OrderId, OrderLineItem};
use crate::domain::product::{Product, ProductId, StockAdjustment};

use super::{CustomerLookup, OrderStore, ProductCatalog, StoreError};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Intended for development and tests. Each store guards a single HashMap with
// a tokio RwLock.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id.clone(), customer);
    }
}

#[async_trait]
impl CustomerLookup for InMemoryCustomerStore {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.customers.read().await.get(id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id.clone(), product);
    }

    pub async fn get(&self, id: &ProductId) -> Option<Product> {
        self.products.read().await.get(id).cloned()
    }

    pub async fn set_price(&self, id: &ProductId, price: f64) -> Result<(), StoreError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        product.price = price;
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_all_by_id(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    /// All-or-nothing: nothing is written unless every adjustment fits.
    async fn update_quantity(&self, adjustments: &[StockAdjustment]) -> Result<(), StoreError> {
        let mut products = self.products.write().await;

        let mut remaining: HashMap<&ProductId, i32> = HashMap::new();
        for adjustment in adjustments {
            let current = match remaining.get(&adjustment.id) {
                Some(quantity) => *quantity,
                None => products
                    .get(&adjustment.id)
                    .map(|p| p.quantity)
                    .ok_or_else(|| StoreError::NotFound(format!("product {}", adjustment.id)))?,
            };

            let next = current - adjustment.quantity;
            if next < 0 {
                return Err(StoreError::Conflict(format!(
                    "stock of product {} would drop to {}",
                    adjustment.id, next
                )));
            }
            remaining.insert(&adjustment.id, next);
        }

        for (id, quantity) in remaining {
            if let Some(product) = products.get_mut(id) {
                product.quantity = quantity;
            }
        }

        tracing::debug!(adjustments = adjustments.len(), "Decremented product stock");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, customer: &Customer, products: Vec<OrderLineItem>) -> Result<Order, StoreError> {
        let order = Order {
            id: OrderId::new(),
            customer: customer.clone(),
            products,
            created_at: Utc::now(),
        };

        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &OrderId) -> Result<(), StoreError> {
        match self.orders.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("order {id}"))),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
