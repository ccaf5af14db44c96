use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::product::{Product, ProductId};
use crate::metrics::Metrics;
use crate::store::{CustomerLookup, OrderStore, ProductCatalog};
use crate::utils::{retry_on_transient, RetryConfig};

use super::errors::OrderError;
use super::value_objects::{Order, OrderId, OrderLineItem, OrderRequest};

// ============================================================================
// Order Creation Workflow
// ============================================================================
//
// Customer → request shape → products → stock → persist order → decrement
//
// Every rejection happens before the first write. Calls to the stores are
// strictly sequential.
//
// ============================================================================

pub struct OrderCreationWorkflow {
    customers: Arc<dyn CustomerLookup>,
    products: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
    compensation_retry: RetryConfig,
}

impl OrderCreationWorkflow {
    pub fn new(
        customers: Arc<dyn CustomerLookup>,
        products: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            customers,
            products,
            orders,
            metrics,
            compensation_retry: RetryConfig::default(),
        }
    }

    /// Backoff used when deleting an order whose stock update failed
    pub fn with_compensation_retry(mut self, config: RetryConfig) -> Self {
        self.compensation_retry = config;
        self
    }

    /// Validate the request, persist the order and decrement stock.
    ///
    /// Not idempotent: the same request placed twice yields two orders.
    #[tracing::instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, line_count = request.products.len())
    )]
    pub async fn execute(&self, request: OrderRequest) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.place_order(&request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(order) => {
                self.metrics.record_order_placed(order.products.len(), elapsed);
                tracing::info!(
                    order_id = %order.id,
                    line_items = order.products.len(),
                    total = order.total(),
                    "Order placed"
                );
            }
            Err(e) => {
                self.metrics.record_order_rejected(e.reason(), elapsed);
                if e.is_validation() {
                    tracing::warn!(reason = e.reason(), error = %e, "Order rejected");
                } else {
                    tracing::error!(reason = e.reason(), error = %e, "Order placement failed");
                }
            }
        }

        result
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order, OrderError> {
        let customer = self
            .customers
            .find_by_id(&request.customer_id)
            .await?
            .ok_or_else(|| OrderError::CustomerNotFound(request.customer_id.clone()))?;

        validate_request(request)?;

        let existing = self
            .products
            .find_all_by_id(&request.distinct_product_ids())
            .await?;
        let line_items = price_line_items(request, &existing)?;

        let order = self.orders.create(&customer, line_items).await?;
        tracing::debug!(order_id = %order.id, "Order persisted, decrementing stock");

        if let Err(source) = self.products.update_quantity(&request.stock_adjustments()).await {
            let compensated = self.compensate(order.id).await;
            return Err(OrderError::StockUpdate {
                order_id: order.id,
                compensated,
                source,
            });
        }

        Ok(order)
    }

    /// Remove an order whose stock could not be decremented
    async fn compensate(&self, order_id: OrderId) -> bool {
        let orders = self.orders.clone();
        let result = retry_on_transient(self.compensation_retry.clone(), |attempt| {
            let orders = orders.clone();
            async move {
                tracing::debug!(attempt = attempt, order_id = %order_id, "Deleting order");
                orders.delete(&order_id).await
            }
        })
        .await;

        let success = result.is_success();
        self.metrics.record_compensation(success);
        if success {
            tracing::warn!(order_id = %order_id, "Removed order after failed stock update");
        } else {
            tracing::error!(order_id = %order_id, "Order left without stock decrement");
        }

        success
    }
}

fn validate_request(request: &OrderRequest) -> Result<(), OrderError> {
    if request.products.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    if let Some(invalid) = request.products.iter().find(|p| p.quantity <= 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: invalid.id.clone(),
            quantity: invalid.quantity,
        });
    }

    Ok(())
}

/// Checks existence, then stock, then snapshots prices in request order.
/// Each failure names the first offending entry only.
fn price_line_items(request: &OrderRequest, existing: &[Product]) -> Result<Vec<OrderLineItem>, OrderError> {
    let by_id: HashMap<&ProductId, &Product> = existing.iter().map(|p| (&p.id, p)).collect();

    let mut matched: Vec<&Product> = Vec::with_capacity(request.products.len());
    for requested in &request.products {
        match by_id.get(&requested.id) {
            Some(&product) => matched.push(product),
            None => return Err(OrderError::ProductNotFound(requested.id.clone())),
        }
    }

    for (requested, product) in request.products.iter().zip(&matched) {
        if !product.has_stock_for(requested.quantity) {
            tracing::debug!(
                product_id = %requested.id,
                requested = requested.quantity,
                available = product.quantity,
                "Insufficient stock"
            );
            return Err(OrderError::InsufficientStock {
                product_id: requested.id.clone(),
                requested: requested.quantity,
            });
        }
    }

    Ok(request
        .products
        .iter()
        .zip(matched)
        .map(|(requested, product)| OrderLineItem {
            product_id: requested.id.clone(),
            quantity: requested.quantity,
            price: product.price,
        })
        .collect())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::domain::customer::Customer;
    use crate::domain::order::RequestedProduct;
    use crate::domain::product::StockAdjustment;
    use crate::store::{
        InMemoryCustomerStore, InMemoryOrderStore, InMemoryProductCatalog, StoreError,
    };

    /// Catalog that records calls and can be told to fail the stock update
    struct RecordingCatalog {
        inner: InMemoryProductCatalog,
        update_calls: Mutex<Vec<Vec<StockAdjustment>>>,
        fail_update: Option<StoreError>,
    }

    impl RecordingCatalog {
        fn update_calls(&self) -> Vec<Vec<StockAdjustment>> {
            self.update_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProductCatalog for RecordingCatalog {
        async fn find_all_by_id(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
            self.inner.find_all_by_id(ids).await
        }

        async fn update_quantity(&self, adjustments: &[StockAdjustment]) -> Result<(), StoreError> {
            self.update_calls.lock().unwrap().push(adjustments.to_vec());
            match &self.fail_update {
                Some(error) => Err(error.clone()),
                None => self.inner.update_quantity(adjustments).await,
            }
        }
    }

    /// Order store whose create or delete can be made to fail
    struct FaultyOrderStore {
        inner: InMemoryOrderStore,
        fail_create: bool,
        fail_delete: bool,
        delete_attempts: AtomicU32,
    }

    #[async_trait]
    impl OrderStore for FaultyOrderStore {
        async fn create(&self, customer: &Customer, products: Vec<OrderLineItem>) -> Result<Order, StoreError> {
            if self.fail_create {
                return Err(StoreError::Backend("write timeout".into()));
            }
            self.inner.create(customer, products).await
        }

        async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn delete(&self, id: &OrderId) -> Result<(), StoreError> {
            self.delete_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                return Err(StoreError::Unavailable("node down".into()));
            }
            self.inner.delete(id).await
        }
    }

    struct UnreachableCustomers;

    #[async_trait]
    impl CustomerLookup for UnreachableCustomers {
        async fn find_by_id(&self, _id: &crate::domain::customer::CustomerId) -> Result<Option<Customer>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct Fixture {
        customers: Arc<InMemoryCustomerStore>,
        catalog: Arc<RecordingCatalog>,
        orders: Arc<FaultyOrderStore>,
        metrics: Arc<Metrics>,
    }

    #[derive(Default)]
    struct Faults {
        fail_create: bool,
        fail_update: Option<StoreError>,
        fail_delete: bool,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_faults(Faults::default()).await
        }

        async fn with_faults(faults: Faults) -> Self {
            let customers = InMemoryCustomerStore::new();
            customers.insert(Customer::new("c1", "Alice", "alice@example.com")).await;

            let inner = InMemoryProductCatalog::new();
            inner.insert(Product::new("p1", "Widget", 10.0, 5)).await;
            inner.insert(Product::new("p2", "Gadget", 2.5, 1)).await;
            inner.insert(Product::new("p3", "Gizmo", 7.0, 100)).await;

            Self {
                customers: Arc::new(customers),
                catalog: Arc::new(RecordingCatalog {
                    inner,
                    update_calls: Mutex::new(Vec::new()),
                    fail_update: faults.fail_update,
                }),
                orders: Arc::new(FaultyOrderStore {
                    inner: InMemoryOrderStore::new(),
                    fail_create: faults.fail_create,
                    fail_delete: faults.fail_delete,
                    delete_attempts: AtomicU32::new(0),
                }),
                metrics: Arc::new(Metrics::new().unwrap()),
            }
        }

        fn workflow(&self) -> OrderCreationWorkflow {
            OrderCreationWorkflow::new(
                self.customers.clone(),
                self.catalog.clone(),
                self.orders.clone(),
                self.metrics.clone(),
            )
            .with_compensation_retry(RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            })
        }

        async fn stock(&self, id: &str) -> i32 {
            self.catalog.inner.get(&id.into()).await.unwrap().quantity
        }

        async fn order_count(&self) -> usize {
            self.orders.inner.len().await
        }

        async fn assert_untouched(&self) {
            assert_eq!(self.order_count().await, 0);
            assert!(self.catalog.update_calls().is_empty());
            assert_eq!(self.stock("p1").await, 5);
            assert_eq!(self.stock("p2").await, 1);
            assert_eq!(self.stock("p3").await, 100);
        }
    }

    fn request(customer_id: &str, products: &[(&str, i32)]) -> OrderRequest {
        OrderRequest::new(
            customer_id,
            products
                .iter()
                .map(|(id, quantity)| RequestedProduct::new(*id, *quantity))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_places_order_and_decrements_stock() {
        let fixture = Fixture::new().await;

        let order = fixture.workflow().execute(request("c1", &[("p1", 2)])).await.unwrap();

        assert_eq!(order.customer.id.as_str(), "c1");
        assert_eq!(
            order.products,
            vec![OrderLineItem { product_id: "p1".into(), quantity: 2, price: 10.0 }]
        );
        assert_eq!(fixture.stock("p1").await, 3);

        let stored = fixture.orders.find_by_id(&order.id).await.unwrap();
        assert_eq!(stored, Some(order));
    }

    #[tokio::test]
    async fn test_unknown_customer_is_rejected_without_mutation() {
        let fixture = Fixture::new().await;

        let err = fixture.workflow().execute(request("cX", &[("p1", 2)])).await.unwrap_err();

        assert!(matches!(&err, OrderError::CustomerNotFound(id) if id.as_str() == "cX"));
        assert!(err.to_string().contains("cX"));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_unknown_customer_wins_over_malformed_request() {
        let fixture = Fixture::new().await;

        let err = fixture.workflow().execute(request("cX", &[])).await.unwrap_err();

        assert!(matches!(err, OrderError::CustomerNotFound(_)));
    }

    #[tokio::test]
    async fn test_reports_first_missing_product_in_request_order() {
        let fixture = Fixture::new().await;

        let err = fixture
            .workflow()
            .execute(request("c1", &[("p1", 1), ("pY", 1), ("pZ", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(&err, OrderError::ProductNotFound(id) if id.as_str() == "pY"));
        assert!(err.to_string().contains("pY"));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_missing_product_is_checked_before_stock() {
        let fixture = Fixture::new().await;

        let err = fixture
            .workflow()
            .execute(request("c1", &[("p1", 99), ("pY", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(&err, OrderError::ProductNotFound(id) if id.as_str() == "pY"));
    }

    #[tokio::test]
    async fn test_insufficient_stock_reports_requested_quantity() {
        let fixture = Fixture::new().await;

        let err = fixture.workflow().execute(request("c1", &[("p2", 3)])).await.unwrap_err();

        match &err {
            OrderError::InsufficientStock { product_id, requested } => {
                assert_eq!(product_id.as_str(), "p2");
                assert_eq!(*requested, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("p2"));
        assert!(message.contains('3'));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_insufficient_stock_reports_first_offender() {
        let fixture = Fixture::new().await;

        let err = fixture
            .workflow()
            .execute(request("c1", &[("p3", 1), ("p2", 2), ("p1", 9)]))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            OrderError::InsufficientStock { product_id, requested: 2 } if product_id.as_str() == "p2"
        ));
    }

    #[tokio::test]
    async fn test_exact_stock_is_enough() {
        let fixture = Fixture::new().await;

        fixture.workflow().execute(request("c1", &[("p1", 5)])).await.unwrap();

        assert_eq!(fixture.stock("p1").await, 0);
    }

    #[tokio::test]
    async fn test_empty_order_is_rejected() {
        let fixture = Fixture::new().await;

        let err = fixture.workflow().execute(request("c1", &[])).await.unwrap_err();

        assert!(matches!(err, OrderError::EmptyOrder));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_non_positive_quantity_is_rejected() {
        let fixture = Fixture::new().await;

        let err = fixture
            .workflow()
            .execute(request("c1", &[("p1", 1), ("p3", 0)]))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            OrderError::InvalidQuantity { product_id, quantity: 0 } if product_id.as_str() == "p3"
        ));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_line_items_follow_request_order_with_price_snapshot() {
        let fixture = Fixture::new().await;

        let order = fixture
            .workflow()
            .execute(request("c1", &[("p3", 4), ("p1", 1), ("p2", 1)]))
            .await
            .unwrap();

        fixture.catalog.inner.set_price(&"p1".into(), 99.0).await.unwrap();

        let ids: Vec<&str> = order.products.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1", "p2"]);
        let prices: Vec<f64> = order.products.iter().map(|i| i.price).collect();
        assert_eq!(prices, vec![7.0, 10.0, 2.5]);

        let stored = fixture.orders.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.products[1].price, 10.0);
        assert_eq!(order.total(), 40.5);
    }

    #[tokio::test]
    async fn test_stock_update_called_once_with_requested_quantities() {
        let fixture = Fixture::new().await;

        fixture
            .workflow()
            .execute(request("c1", &[("p3", 4), ("p1", 2)]))
            .await
            .unwrap();

        assert_eq!(
            fixture.catalog.update_calls(),
            vec![vec![StockAdjustment::new("p3", 4), StockAdjustment::new("p1", 2)]]
        );
        assert_eq!(fixture.stock("p3").await, 96);
        assert_eq!(fixture.stock("p1").await, 3);
    }

    #[tokio::test]
    async fn test_duplicate_entries_are_kept_separately() {
        let fixture = Fixture::new().await;

        let order = fixture
            .workflow()
            .execute(request("c1", &[("p1", 2), ("p1", 3)]))
            .await
            .unwrap();

        assert_eq!(order.products.len(), 2);
        assert_eq!(fixture.stock("p1").await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_entries_exceeding_stock_are_rolled_back() {
        let fixture = Fixture::new().await;

        // Each entry fits the stock of 5 on its own; together they do not
        let err = fixture
            .workflow()
            .execute(request("c1", &[("p1", 3), ("p1", 3)]))
            .await
            .unwrap_err();

        match err {
            OrderError::StockUpdate { compensated, source, .. } => {
                assert!(compensated);
                assert!(matches!(source, StoreError::Conflict(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fixture.order_count().await, 0);
        assert_eq!(fixture.stock("p1").await, 5);
    }

    #[tokio::test]
    async fn test_repeated_requests_create_distinct_orders() {
        let fixture = Fixture::new().await;
        let workflow = fixture.workflow();

        let first = workflow.execute(request("c1", &[("p1", 2)])).await.unwrap();
        let second = workflow.execute(request("c1", &[("p1", 2)])).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(fixture.order_count().await, 2);
        assert_eq!(fixture.stock("p1").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_orders_for_different_products() {
        let fixture = Fixture::new().await;
        let workflow = fixture.workflow();

        let (a, b) = tokio::join!(
            workflow.execute(request("c1", &[("p1", 1)])),
            workflow.execute(request("c1", &[("p3", 10)])),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(fixture.stock("p1").await, 4);
        assert_eq!(fixture.stock("p3").await, 90);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let fixture = Fixture::new().await;
        let workflow = OrderCreationWorkflow::new(
            Arc::new(UnreachableCustomers),
            fixture.catalog.clone(),
            fixture.orders.clone(),
            fixture.metrics.clone(),
        );

        let err = workflow.execute(request("c1", &[("p1", 1)])).await.unwrap_err();

        assert!(matches!(err, OrderError::Store(StoreError::Unavailable(_))));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_persistence_failure_skips_stock_update() {
        let fixture = Fixture::with_faults(Faults { fail_create: true, ..Faults::default() }).await;

        let err = fixture.workflow().execute(request("c1", &[("p1", 1)])).await.unwrap_err();

        assert!(matches!(err, OrderError::Store(StoreError::Backend(_))));
        fixture.assert_untouched().await;
    }

    #[tokio::test]
    async fn test_failed_stock_update_removes_order() {
        let fixture = Fixture::with_faults(Faults {
            fail_update: Some(StoreError::Conflict("stock changed".into())),
            ..Faults::default()
        })
        .await;

        let err = fixture.workflow().execute(request("c1", &[("p1", 1)])).await.unwrap_err();

        match err {
            OrderError::StockUpdate { compensated, source, .. } => {
                assert!(compensated);
                assert_eq!(source, StoreError::Conflict("stock changed".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fixture.order_count().await, 0);
        assert_eq!(fixture.catalog.update_calls().len(), 1);
        assert_eq!(fixture.stock("p1").await, 5);
        assert_eq!(fixture.metrics.compensations.with_label_values(&["deleted"]).get(), 1);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_reported() {
        let fixture = Fixture::with_faults(Faults {
            fail_update: Some(StoreError::Unavailable("catalog down".into())),
            fail_delete: true,
            ..Faults::default()
        })
        .await;

        let err = fixture.workflow().execute(request("c1", &[("p1", 1)])).await.unwrap_err();

        match &err {
            OrderError::StockUpdate { order_id, compensated, .. } => {
                assert!(!compensated);
                assert!(fixture.orders.find_by_id(order_id).await.unwrap().is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.reason(), "stock_update_failed");
        assert_eq!(fixture.orders.delete_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(fixture.catalog.update_calls().len(), 1);
        assert_eq!(fixture.metrics.compensations.with_label_values(&["failed"]).get(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_are_recorded_in_metrics() {
        let fixture = Fixture::new().await;
        let workflow = fixture.workflow();

        workflow.execute(request("c1", &[("p1", 1), ("p3", 1)])).await.unwrap();
        let _ = workflow.execute(request("cX", &[("p1", 1)])).await;
        let _ = workflow.execute(request("c1", &[("pY", 1)])).await;

        assert_eq!(fixture.metrics.orders_placed.get(), 1);
        assert_eq!(fixture.metrics.order_line_items.get(), 2);
        assert_eq!(
            fixture.metrics.orders_rejected.with_label_values(&["customer_not_found"]).get(),
            1
        );
        assert_eq!(
            fixture.metrics.orders_rejected.with_label_values(&["product_not_found"]).get(),
            1
        );
    }
}
