//! Transaction Pool Module
//!
//! This module manages transactions that passed validation but are not yet
//! committed to a block, and the read-only facade the validator uses to see
//! pending genesis transactions.

mod tx_pool;
mod view;

pub use tx_pool::TransactionPool;
pub use view::PendingPoolView;
