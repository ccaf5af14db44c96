// ============================================================================
// Product Domain
// ============================================================================
//
// Products carry the price and the available stock consulted when placing
// an order. The catalog owns them; ordering reads them and asks the catalog
// to decrement stock.
//
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
