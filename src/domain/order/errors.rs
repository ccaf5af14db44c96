use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::store::StoreError;

use super::value_objects::OrderId;

// ============================================================================
// Order Placement Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("The customer with id {0} does not exist")]
    CustomerNotFound(CustomerId),

    #[error("There is no product with the id {0}")]
    ProductNotFound(ProductId),

    #[error("The product with id {product_id} does not have {requested} units")]
    InsufficientStock { product_id: ProductId, requested: i32 },

    #[error("Order items cannot be empty")]
    EmptyOrder,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// Stock could not be decremented after the order was persisted.
    /// `compensated` tells whether the order was removed again.
    #[error("Stock update failed for order {order_id} (compensated: {compensated}): {source}")]
    StockUpdate {
        order_id: OrderId,
        compensated: bool,
        #[source]
        source: StoreError,
    },
}

impl OrderError {
    /// Stable label for metrics and for callers branching on the kind
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::CustomerNotFound(_) => "customer_not_found",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::Store(_) => "store_failure",
            OrderError::StockUpdate { .. } => "stock_update_failed",
        }
    }

    /// True for rejections raised before anything was written
    pub fn is_validation(&self) -> bool {
        !matches!(self, OrderError::Store(_) | OrderError::StockUpdate { .. })
    }
}
