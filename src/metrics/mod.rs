mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for order placement
// ============================================================================
//
// - placed orders and line items
// - rejections by reason
// - end-to-end placement latency by outcome
// - compensating deletes after a failed stock update
//
// Exposed via /metrics (see server.rs).
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_placed: IntCounter,
    pub order_line_items: IntCounter,
    pub orders_rejected: IntCounterVec,
    pub placement_duration: HistogramVec,
    pub compensations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Total orders successfully placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_line_items = IntCounter::new(
            "order_line_items_total",
            "Total line items across placed orders",
        )?;
        registry.register(Box::new(order_line_items.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Total order requests that failed"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let placement_duration = HistogramVec::new(
            HistogramOpts::new("order_placement_duration_seconds", "Order placement duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(placement_duration.clone()))?;

        let compensations = IntCounterVec::new(
            Opts::new(
                "order_compensations_total",
                "Orders deleted again after the stock update failed",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(compensations.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            order_line_items,
            orders_rejected,
            placement_duration,
            compensations,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_placed(&self, line_items: usize, duration_secs: f64) {
        self.orders_placed.inc();
        self.order_line_items.inc_by(line_items as u64);
        self.placement_duration.with_label_values(&["placed"]).observe(duration_secs);
    }

    pub fn record_order_rejected(&self, reason: &str, duration_secs: f64) {
        self.orders_rejected.with_label_values(&[reason]).inc();
        self.placement_duration.with_label_values(&["rejected"]).observe(duration_secs);
    }

    pub fn record_compensation(&self, success: bool) {
        let outcome = if success { "deleted" } else { "failed" };
        self.compensations.with_label_values(&[outcome]).inc();
    }
}
