use super::LedgerView;
use crate::{Transaction, TransactionKind, TxHash};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainAuditError {
    #[error("transaction {0:?} not found on the ledger")]
    MissingLink(TxHash),
    #[error("custody chain revisits transaction {0:?}")]
    Cycle(TxHash),
    #[error("transaction {0:?} is not part of a workflow")]
    NotInWorkflow(TxHash),
}

/// Walk a custody chain from `head` back to its genesis transaction
///
/// Read-only audit over committed history. Admission does not run this walk.
///
/// # Returns
/// The chain newest first, ending with the genesis transaction
pub fn custody_chain(ledger: &dyn LedgerView, head: TxHash) -> Result<Vec<Transaction>, ChainAuditError> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = head;

    loop {
        if !visited.insert(cursor) {
            return Err(ChainAuditError::Cycle(cursor));
        }
        let tx = ledger
            .get_transaction(&cursor)
            .ok_or(ChainAuditError::MissingLink(cursor))?;

        let next = match tx.kind() {
            TransactionKind::Workflow(_) => None,
            TransactionKind::Task(task) => Some(task.previous_transaction),
            TransactionKind::Plain => return Err(ChainAuditError::NotInWorkflow(cursor)),
        };
        chain.push(tx);

        match next {
            Some(previous) => cursor = previous,
            None => return Ok(chain),
        }
    }
}
