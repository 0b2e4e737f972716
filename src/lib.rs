//! This crate implements the validation core of a permissioned document-workflow ledger.
//! Documents move between participants as signed transactions; a genesis transaction
//! defines the workflow and every task hands custody on along the process graph.
//! It includes modules for transaction types, cryptography, participant identifiers,
//! the ledger and pending pool facades, validation, the node service, and configuration.

pub mod types; // Transactions, payloads, and validation errors.
pub mod crypto; // Signing, verification, hashing, and key handling.
pub mod identity; // Process identifier (PID) codec.
pub mod ledger; // Committed transactions: query facade, blocks, and audit.
pub mod pool; // Validated transactions waiting for a block.
pub mod validation; // Admission rules and validation locking.
pub mod node; // Submission service and transaction import.
pub mod config; // Defines and loads node configuration.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use node::Node;
pub use validation::Validator;
