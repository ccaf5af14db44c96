use anyhow::Context;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_placement::config::{AppConfig, StoreBackend};
use order_placement::domain::customer::Customer;
use order_placement::domain::order::{OrderCreationWorkflow, OrderRequest, RequestedProduct};
use order_placement::domain::product::Product;
use order_placement::metrics::{self, Metrics};
use order_placement::store::{
    self, InMemoryCustomerStore, InMemoryOrderStore, InMemoryProductCatalog, ScyllaCustomerStore,
    ScyllaOrderStore, ScyllaProductCatalog,
};

fn demo_customers() -> Vec<Customer> {
    vec![Customer::new("c1", "Alice", "alice@example.com")]
}

fn demo_products() -> Vec<Product> {
    vec![
        Product::new("p1", "Widget", 10.0, 5),
        Product::new("p2", "Gadget", 2.5, 1),
    ]
}

async fn build_in_memory(metrics: Arc<Metrics>) -> OrderCreationWorkflow {
    let customers = Arc::new(InMemoryCustomerStore::new());
    for customer in demo_customers() {
        customers.insert(customer).await;
    }

    let products = Arc::new(InMemoryProductCatalog::new());
    for product in demo_products() {
        products.insert(product).await;
    }

    OrderCreationWorkflow::new(customers, products, Arc::new(InMemoryOrderStore::new()), metrics)
}

async fn build_scylla(config: &AppConfig, metrics: Arc<Metrics>) -> anyhow::Result<OrderCreationWorkflow> {
    tracing::info!(node = %config.scylla_node, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_node(&config.scylla_node)
        .build()
        .await
        .context("failed to connect to ScyllaDB")?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                config.keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(&config.keyspace, false).await?;
    store::scylla::create_schema(&session).await?;

    let session = Arc::new(session);

    let customers = Arc::new(ScyllaCustomerStore::new(session.clone()));
    for customer in demo_customers() {
        customers.upsert_customer(&customer).await?;
    }

    let products = Arc::new(ScyllaProductCatalog::new(session.clone()));
    for product in demo_products() {
        products.upsert_product(&product).await?;
    }

    let orders = Arc::new(ScyllaOrderStore::new(session));
    Ok(OrderCreationWorkflow::new(customers, products, orders, metrics))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_placement=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "Starting order placement service");

    let metrics = Arc::new(Metrics::new()?);

    if let Some(port) = config.metrics_port {
        let registry = Arc::new(metrics.registry().clone());
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(metrics::start_metrics_server(registry, port)) {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    let workflow = match config.store_backend {
        StoreBackend::Memory => build_in_memory(metrics.clone()).await,
        StoreBackend::Scylla => build_scylla(&config, metrics.clone()).await?,
    };

    let scenarios = [
        ("place order", OrderRequest::new("c1", vec![RequestedProduct::new("p1", 2)])),
        ("unknown customer", OrderRequest::new("cX", vec![RequestedProduct::new("p1", 1)])),
        ("unknown product", OrderRequest::new("c1", vec![RequestedProduct::new("pY", 1)])),
        ("insufficient stock", OrderRequest::new("c1", vec![RequestedProduct::new("p2", 3)])),
    ];

    for (name, request) in scenarios {
        let outcome = workflow
            .execute(request)
            .instrument(tracing::info_span!("scenario", name))
            .await;

        match outcome {
            Ok(order) => {
                let order = serde_json::to_string(&order)?;
                tracing::info!(%order, "Scenario produced an order");
            }
            Err(e) => tracing::info!(reason = e.reason(), error = %e, "Scenario was refused"),
        }
    }

    tracing::info!(placed = metrics.orders_placed.get(), "Demo complete");

    if let Some(port) = config.metrics_port {
        tracing::info!(port, "Serving /metrics and /health until Ctrl-C");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        tracing::info!("Shutting down");
    }

    Ok(())
}
