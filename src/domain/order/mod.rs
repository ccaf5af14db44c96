// ============================================================================
// Order Domain - Order Placement
// ============================================================================
//
// - Value objects (OrderRequest, OrderLineItem, Order)
// - Errors (OrderError)
// - Workflow (OrderCreationWorkflow), the only piece with decision logic
//
// Persistence lives behind the traits in crate::store.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod workflow;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use workflow::*;
