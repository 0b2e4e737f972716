//! Node Module
//!
//! Wires the validator, the pending pool and the ledger into one submission
//! service: transactions come in, are validated, wait in the pool and are
//! sealed into blocks. `import` replays a file of transactions through it.

mod import;
mod service;

pub use import::{replay, ImportFile, ImportKey, ImportSummary};
pub use service::{Node, SubmitError};
