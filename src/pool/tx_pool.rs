//! Transaction Pool Module
//!
//! This module implements a pool for validated transactions waiting for a block.
//! Transactions are stored in a FIFO queue and moved out by block sealing.

use super::PendingPoolView;
use crate::{Transaction, TransactionType, TxHash};
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Pool for pending transactions
///
/// Stores validated transactions in a FIFO queue waiting to be committed.
/// Uses VecDeque for efficient insertion at the back and removal from the front.
/// Protected by RwLock for concurrent access.
pub struct TransactionPool {
    /// Queue of pending transactions, protected by a read-write lock
    transactions: RwLock<VecDeque<Transaction>>,
}

impl TransactionPool {
    /// Creates a new empty transaction pool
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(VecDeque::new()),
        }
    }

    /// Add a validated transaction to the pool
    ///
    /// Transactions are added to the back of the queue (FIFO ordering).
    ///
    /// # Returns
    /// `false` if a transaction with the same hash is already pending
    pub fn add(&self, tx: Transaction) -> bool {
        let mut txs = self.transactions.write();
        if txs.iter().any(|pending| pending.hash() == tx.hash()) {
            return false;
        }
        txs.push_back(tx);
        true
    }

    /// Move pending transactions out of the pool for a block
    ///
    /// Removes and returns up to `max` transactions from the front of the queue.
    ///
    /// # Arguments
    /// * `max` - Maximum number of transactions to take
    pub fn take_pending(&self, max: usize) -> Vec<Transaction> {
        let mut txs = self.transactions.write();
        let len = txs.len();
        txs.drain(..max.min(len)).collect()
    }

    /// Drop a pending transaction
    ///
    /// # Returns
    /// The removed transaction, if it was pending
    pub fn remove(&self, hash: &TxHash) -> Option<Transaction> {
        let mut txs = self.transactions.write();
        let index = txs.iter().position(|tx| tx.hash() == *hash)?;
        txs.remove(index)
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.transactions.read().iter().any(|tx| tx.hash() == *hash)
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingPoolView for TransactionPool {
    fn get_pending_workflow_transactions(&self) -> Vec<Transaction> {
        self.transactions
            .read()
            .iter()
            .filter(|tx| tx.transaction_type() == TransactionType::Workflow)
            .cloned()
            .collect()
    }
}
