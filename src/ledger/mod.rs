//! Ledger Module
//!
//! Read-only facade the validator uses to resolve references and scan
//! committed history, plus an in-memory block store implementing it.
//!
//! # Components
//! - `LedgerView`: query facade over committed transactions
//! - `InMemoryLedger`: indexed, append-only reference implementation
//! - `Block`: sealed group of committed transactions
//! - `custody_chain`: read-only audit walk back to a workflow's genesis

mod audit;
mod block;
mod memory;
mod view;

pub use audit::{custody_chain, ChainAuditError};
pub use block::{merkle_root, Block};
pub use memory::InMemoryLedger;
pub use view::LedgerView;
