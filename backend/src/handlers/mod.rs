//! HTTP handlers for the Warehouse Stock Ledger

pub mod health;
pub mod recalc;
pub mod stock;

pub use health::*;
pub use recalc::*;
pub use stock::*;
