use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::errors::{DbError, ExecutionError, RequestAttemptError};
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::Batch;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::order::{Order, OrderId, OrderLineItem};
use crate::domain::product::{Product, ProductId, StockAdjustment};

use super::{CustomerLookup, OrderStore, ProductCatalog, StoreError};

// ============================================================================
// ScyllaDB Stores
// ============================================================================
//
// Tables (created by `create_schema`):
// - customers        (id) -> name, email
// - products         (id) -> name, price, quantity
// - orders           (id) -> customer snapshot, created_at
// - order_products   (order_id, position) -> product_id, quantity, price
//
// Multi-row writes go through a single logged batch so an order and its line
// items land together.
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customers (
        id text PRIMARY KEY,
        name text,
        email text
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id text PRIMARY KEY,
        name text,
        price double,
        quantity int
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        customer_id text,
        customer_name text,
        customer_email text,
        created_at timestamp
    )",
    "CREATE TABLE IF NOT EXISTS order_products (
        order_id uuid,
        position int,
        product_id text,
        quantity int,
        price double,
        PRIMARY KEY (order_id, position)
    )",
];

/// Maps a driver failure onto the store taxonomy. Lost connections, client
/// timeouts and coordinator-side unavailability or overload become
/// `Unavailable` and are retried by callers; everything else is `Backend`.
fn execution_error(error: ExecutionError) -> StoreError {
    let transient = match &error {
        ExecutionError::ConnectionPoolError(_) | ExecutionError::RequestTimeout(_) => true,
        ExecutionError::LastAttemptError(attempt) => match attempt {
            RequestAttemptError::BrokenConnectionError(_)
            | RequestAttemptError::UnableToAllocStreamId => true,
            RequestAttemptError::DbError(db_error, _) => matches!(
                db_error,
                DbError::Unavailable { .. }
                    | DbError::Overloaded
                    | DbError::IsBootstrapping
                    | DbError::ReadTimeout { .. }
                    | DbError::WriteTimeout { .. }
            ),
            _ => false,
        },
        _ => false,
    };

    if transient {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::backend(error)
    }
}

/// Create the ordering tables in the session's current keyspace
pub async fn create_schema(session: &Session) -> Result<(), StoreError> {
    for statement in SCHEMA {
        session
            .query_unpaged(*statement, &[])
            .await
            .map_err(execution_error)?;
    }

    tracing::info!(tables = SCHEMA.len(), "Ordering schema ready");
    Ok(())
}

// ============================================================================
// Customers
// ============================================================================

pub struct ScyllaCustomerStore {
    session: Arc<Session>,
}

impl ScyllaCustomerStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn upsert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.session
            .query_unpaged(
                "INSERT INTO customers (id, name, email) VALUES (?, ?, ?)",
                (customer.id.as_str(), &customer.name, &customer.email),
            )
            .await
            .map_err(execution_error)?;
        Ok(())
    }
}

#[async_trait]
impl CustomerLookup for ScyllaCustomerStore {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        let result = self
            .session
            .query_unpaged("SELECT id, name, email FROM customers WHERE id = ?", (id.as_str(),))
            .await
            .map_err(execution_error)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let row = rows_result
            .maybe_first_row::<(String, Option<String>, Option<String>)>()
            .map_err(StoreError::backend)?;

        Ok(row.map(|(id, name, email)| Customer {
            id: CustomerId(id),
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
        }))
    }
}

// ============================================================================
// Products
// ============================================================================

pub struct ScyllaProductCatalog {
    session: Arc<Session>,
}

impl ScyllaProductCatalog {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.session
            .query_unpaged(
                "INSERT INTO products (id, name, price, quantity) VALUES (?, ?, ?, ?)",
                (product.id.as_str(), &product.name, product.price, product.quantity),
            )
            .await
            .map_err(execution_error)?;
        Ok(())
    }
}

/// Sums the adjustments per product, keeping first-seen order
fn total_by_product(adjustments: &[StockAdjustment]) -> Result<Vec<(ProductId, i32)>, StoreError> {
    let mut totals: Vec<(ProductId, i32)> = Vec::new();
    for adjustment in adjustments {
        match totals.iter_mut().find(|(id, _)| *id == adjustment.id) {
            Some((_, total)) => {
                *total = total.checked_add(adjustment.quantity).ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "requested quantity of product {} overflows",
                        adjustment.id
                    ))
                })?;
            }
            None => totals.push((adjustment.id.clone(), adjustment.quantity)),
        }
    }
    Ok(totals)
}

#[async_trait]
impl ProductCatalog for ScyllaProductCatalog {
    async fn find_all_by_id(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<&str> = ids.iter().map(ProductId::as_str).collect();
        let result = self
            .session
            .query_unpaged(
                "SELECT id, name, price, quantity FROM products WHERE id IN ?",
                (keys,),
            )
            .await
            .map_err(execution_error)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let mut products = Vec::new();
        for row in rows_result
            .rows::<(String, Option<String>, Option<f64>, Option<i32>)>()
            .map_err(StoreError::backend)?
        {
            let (id, name, price, quantity) = row.map_err(StoreError::backend)?;
            products.push(Product {
                id: ProductId(id),
                name: name.unwrap_or_default(),
                price: price.unwrap_or_default(),
                quantity: quantity.unwrap_or_default(),
            });
        }

        tracing::debug!(requested = ids.len(), found = products.len(), "Loaded products");
        Ok(products)
    }

    /// Reads current stock, then writes every new quantity in one logged batch.
    /// Nothing is written if any product is missing or would go negative.
    async fn update_quantity(&self, adjustments: &[StockAdjustment]) -> Result<(), StoreError> {
        if adjustments.is_empty() {
            return Ok(());
        }

        let totals = total_by_product(adjustments)?;
        let ids: Vec<ProductId> = totals.iter().map(|(id, _)| id.clone()).collect();
        let current: HashMap<ProductId, i32> = self
            .find_all_by_id(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.quantity))
            .collect();

        let mut batch = Batch::default();
        let mut values: Vec<(i32, String)> = Vec::with_capacity(totals.len());

        for (id, total) in &totals {
            let stock = current
                .get(id)
                .copied()
                .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;

            let next = stock - total;
            if next < 0 {
                return Err(StoreError::Conflict(format!(
                    "stock of product {id} would drop to {next}"
                )));
            }

            batch.append_statement("UPDATE products SET quantity = ? WHERE id = ?");
            values.push((next, id.as_str().to_string()));
        }

        self.session
            .batch(&batch, values)
            .await
            .map_err(execution_error)?;

        tracing::debug!(products = totals.len(), "Decremented product stock");
        Ok(())
    }
}

// ============================================================================
// Orders
// ============================================================================

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn load_line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT product_id, quantity, price FROM order_products
                 WHERE order_id = ?
                 ORDER BY position ASC",
                (order_id,),
            )
            .await
            .map_err(execution_error)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let mut items = Vec::new();
        for row in rows_result
            .rows::<(String, i32, f64)>()
            .map_err(StoreError::backend)?
        {
            let (product_id, quantity, price) = row.map_err(StoreError::backend)?;
            items.push(OrderLineItem {
                product_id: ProductId(product_id),
                quantity,
                price,
            });
        }

        Ok(items)
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn create(&self, customer: &Customer, products: Vec<OrderLineItem>) -> Result<Order, StoreError> {
        let order = Order {
            id: OrderId::new(),
            customer: customer.clone(),
            products,
            created_at: Utc::now(),
        };

        let mut batch = Batch::default();
        let mut values: Vec<Box<dyn SerializeRow + Send + Sync>> = vec![];

        batch.append_statement(
            "INSERT INTO orders (id, customer_id, customer_name, customer_email, created_at)
             VALUES (?, ?, ?, ?, ?)",
        );
        values.push(Box::new((
            order.id.0,
            order.customer.id.as_str().to_string(),
            order.customer.name.clone(),
            order.customer.email.clone(),
            order.created_at,
        )));

        for (position, item) in order.products.iter().enumerate() {
            let position = i32::try_from(position).map_err(StoreError::backend)?;
            batch.append_statement(
                "INSERT INTO order_products (order_id, position, product_id, quantity, price)
                 VALUES (?, ?, ?, ?, ?)",
            );
            values.push(Box::new((
                order.id.0,
                position,
                item.product_id.as_str().to_string(),
                item.quantity,
                item.price,
            )));
        }

        self.session
            .batch(&batch, values)
            .await
            .map_err(execution_error)?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer.id,
            line_items = order.products.len(),
            "Persisted order"
        );

        Ok(order)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT customer_id, customer_name, customer_email, created_at FROM orders WHERE id = ?",
                (id.0,),
            )
            .await
            .map_err(execution_error)?;

        let rows_result = result.into_rows_result().map_err(StoreError::backend)?;
        let row = rows_result
            .maybe_first_row::<(String, Option<String>, Option<String>, DateTime<Utc>)>()
            .map_err(StoreError::backend)?;

        let Some((customer_id, name, email, created_at)) = row else {
            return Ok(None);
        };

        let products = self.load_line_items(id.0).await?;

        Ok(Some(Order {
            id: *id,
            customer: Customer {
                id: CustomerId(customer_id),
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
            },
            products,
            created_at,
        }))
    }

    async fn delete(&self, id: &OrderId) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        batch.append_statement("DELETE FROM order_products WHERE order_id = ?");
        batch.append_statement("DELETE FROM orders WHERE id = ?");

        self.session
            .batch(&batch, ((id.0,), (id.0,)))
            .await
            .map_err(execution_error)?;

        tracing::info!(order_id = %id, "Deleted order");
        Ok(())
    }
}
