use crate::{Transaction, TransactionType, TxHash};
use std::collections::HashSet;

/// Query facade over committed ledger state
///
/// All reads reflect committed transactions only and must be safe to call
/// from many validations at once.
pub trait LedgerView: Send + Sync {
    fn get_transaction(&self, hash: &TxHash) -> Option<Transaction>;

    fn get_all_transactions(&self) -> Vec<Transaction>;

    fn search_by_sender(&self, public_key: &str) -> Vec<Transaction>;

    fn search_by_receiver(&self, public_key: &str) -> Vec<Transaction>;

    /// Committed genesis transactions carrying `workflow_id`
    ///
    /// The default scans the full history; indexed stores should override it.
    fn find_workflow_transactions(&self, workflow_id: &str) -> Vec<Transaction> {
        self.get_all_transactions()
            .into_iter()
            .filter(|tx| tx.transaction_type() == TransactionType::Workflow)
            .filter(|tx| tx.workflow_id() == Some(workflow_id))
            .collect()
    }

    /// Committed transactions from `sender` to `receiver` that continue
    /// `previous`
    ///
    /// The default intersects the sender and receiver scans.
    fn find_continuations(&self, sender: &str, receiver: &str, previous: &TxHash) -> Vec<Transaction> {
        let sent: HashSet<TxHash> = self
            .search_by_sender(sender)
            .iter()
            .map(Transaction::hash)
            .collect();
        self.search_by_receiver(receiver)
            .into_iter()
            .filter(|tx| sent.contains(&tx.hash()))
            .filter(|tx| tx.previous_transaction() == Some(*previous))
            .collect()
    }

    /// Committed transactions that made `pid` the custodian
    fn transactions_in_charge(&self, pid: &str) -> Vec<Transaction> {
        self.get_all_transactions()
            .into_iter()
            .filter(|tx| tx.in_charge() == Some(pid))
            .collect()
    }
}
