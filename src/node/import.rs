//! Transaction import
//!
//! Replays a JSON file of unsigned transactions, each paired with the
//! private key that signs it:
//!
//! ```json
//! {"transactions": [[{"sender": "..", "receiver": "..", "payload": {..}}, {"private_key": ".."}]]}
//! ```
//!
//! A block is sealed after every accepted entry so later entries can
//! reference earlier ones.

use super::Node;
use crate::{ConfirmationStatus, Transaction, WireTransaction};
use serde::Deserialize;
use std::fs;
use tracing::{error, info, warn};

/// Signing material attached to an import entry
#[derive(Debug, Clone, Deserialize)]
pub struct ImportKey {
    pub private_key: String,
}

/// Contents of an import file
#[derive(Debug, Clone, Deserialize)]
pub struct ImportFile {
    pub transactions: Vec<(WireTransaction, ImportKey)>,
}

impl ImportFile {
    /// Read and parse an import file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: ImportFile = serde_json::from_str(&content)?;
        Ok(file)
    }
}

/// Per-outcome counts of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub accepted: usize,
    pub rejected: usize,
    /// Entries that could not be decoded, signed or submitted
    pub failed: usize,
}

/// Sign and submit every entry of `file` in order
pub async fn replay(node: &Node, file: ImportFile) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let total = file.transactions.len();

    for (index, (wire, key)) in file.transactions.into_iter().enumerate() {
        let mut tx = match Transaction::from_wire(wire) {
            Ok(tx) => tx,
            Err(e) => {
                error!(entry = index, "Cannot decode import entry: {}", e);
                summary.failed += 1;
                continue;
            }
        };
        if let Err(e) = tx.sign(node.provider(), &key.private_key) {
            error!(entry = index, "Cannot sign import entry: {}", e);
            summary.failed += 1;
            continue;
        }

        match node.submit(tx).await {
            Ok(confirmation) => match confirmation.status {
                ConfirmationStatus::Accepted => {
                    info!(entry = index, "Imported transaction {:?}", confirmation.tx_hash);
                    node.seal_block();
                    summary.accepted += 1;
                }
                ConfirmationStatus::Rejected { reason } => {
                    warn!(entry = index, "Import entry rejected: {}", reason);
                    summary.rejected += 1;
                }
            },
            Err(e) => {
                error!(entry = index, "Import entry failed: {}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Import finished: {} of {} accepted, {} rejected, {} failed",
        summary.accepted, total, summary.rejected, summary.failed
    );
    summary
}
