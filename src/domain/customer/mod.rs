// ============================================================================
// Customer Domain
// ============================================================================
//
// Customers are owned by the customer store; ordering only resolves them by id.
//
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
