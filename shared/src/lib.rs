//! Shared types and models for the Warehouse Stock Ledger.
//!
//! This crate contains the pure domain core of the stock snapshot engine:
//! item categories and their balance formulas, stock keys, daily movement
//! totals, and the snapshot/queue/availability models. It has no storage or
//! I/O dependencies so the balance rules can be tested in isolation.

pub mod formula;
pub mod models;
pub mod types;

pub use models::*;
pub use types::*;
