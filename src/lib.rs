//! Order placement service.
//!
//! [`domain::order::OrderCreationWorkflow`] validates an order request against
//! the customer and product stores, persists the order and decrements stock.
//! Stores are injected through the traits in [`store`].

pub mod config;
pub mod domain;
pub mod metrics;
pub mod store;
pub mod utils;
