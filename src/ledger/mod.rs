//! Ledger module - addresses, transactions, and per-block account state

mod accounts;
mod transaction;

pub use accounts::*;
pub use transaction::*;
