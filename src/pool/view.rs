use crate::Transaction;

/// Query facade over the pending pool
///
/// Must be safe for concurrent reads.
pub trait PendingPoolView: Send + Sync {
    /// Genesis transactions accepted locally but not yet in a block
    fn get_pending_workflow_transactions(&self) -> Vec<Transaction>;
}
