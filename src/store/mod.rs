// ============================================================================
// Store Layer - Collaborator Contracts
// ============================================================================
//
// The order workflow only talks to these traits. Two implementations ship:
// - in_memory: HashMap-backed stores for development and tests
// - scylla: ScyllaDB-backed stores
//
// ============================================================================

use async_trait::async_trait;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::order::{Order, OrderId, OrderLineItem};
use crate::domain::product::{Product, ProductId, StockAdjustment};
use crate::utils::IsTransient;

pub mod in_memory;
pub mod scylla;

pub use in_memory::{InMemoryCustomerStore, InMemoryOrderStore, InMemoryProductCatalog};
pub use self::scylla::{ScyllaCustomerStore, ScyllaOrderStore, ScyllaProductCatalog};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(error: impl std::fmt::Display) -> Self {
        Self::Backend(error.to_string())
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[async_trait]
pub trait CustomerLookup: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the products that exist among `ids`; unknown ids are skipped
    async fn find_all_by_id(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// Takes each adjustment's quantity off the matching product's stock
    async fn update_quantity(&self, adjustments: &[StockAdjustment]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order, assigning its id and creation time
    async fn create(&self, customer: &Customer, products: Vec<OrderLineItem>) -> Result<Order, StoreError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn delete(&self, id: &OrderId) -> Result<(), StoreError>;
}
