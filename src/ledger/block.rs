//! Block records
//!
//! A block is a sealed, numbered group of committed transactions chained to
//! its predecessor by hash. Consensus and nonce selection are not modelled.

use crate::crypto::digest;
use crate::{Transaction, TxHash};
use ethers::types::H256;
use serde::Serialize;

/// Sealed block of committed transactions
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    /// Height of the block, starting at 1
    pub number: u64,
    /// Unix seconds at sealing time
    pub timestamp: u64,
    /// Merkle root over the transaction hashes in block order
    pub merkle_root: H256,
    /// Hash of the previous block (zero for the first block)
    pub predecessor_hash: H256,
    /// Node that sealed the block
    pub creator_id: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Seal transactions into a block
    ///
    /// # Arguments
    /// * `number` - Height to assign
    /// * `predecessor_hash` - Hash of the current chain tip
    /// * `creator_id` - Id of the sealing node
    /// * `transactions` - Transactions in commit order
    pub fn seal(number: u64, predecessor_hash: H256, creator_id: &str, transactions: Vec<Transaction>) -> Self {
        let hashes: Vec<TxHash> = transactions.iter().map(Transaction::hash).collect();
        Self {
            number,
            timestamp: chrono::Utc::now().timestamp() as u64,
            merkle_root: merkle_root(&hashes),
            predecessor_hash,
            creator_id: creator_id.to_string(),
            transactions,
        }
    }

    /// Hash of the block header
    pub fn hash(&self) -> H256 {
        let mut data = Vec::new();
        data.extend_from_slice(&self.number.to_be_bytes());
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(self.predecessor_hash.as_bytes());
        data.extend_from_slice(self.creator_id.as_bytes());
        digest(&data)
    }
}

/// Binary Merkle root; an odd node is paired with itself. Zero when empty.
pub fn merkle_root(hashes: &[TxHash]) -> H256 {
    if hashes.is_empty() {
        return H256::zero();
    }

    let mut level: Vec<H256> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut data = [0u8; 64];
                data[..32].copy_from_slice(left.as_bytes());
                data[32..].copy_from_slice(right.as_bytes());
                digest(&data)
            })
            .collect();
    }
    level[0]
}
