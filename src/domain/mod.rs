// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// One subdirectory per entity. Customers and products are read through the
// store traits; orders are created by the order placement workflow.
//
// ============================================================================

pub mod customer;
pub mod product;
pub mod order;
