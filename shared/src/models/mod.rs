//! Domain models for the Warehouse Stock Ledger

mod availability;
mod queue;
mod snapshot;

pub use availability::*;
pub use queue::*;
pub use snapshot::*;
