use super::{Block, LedgerView};
use crate::{Transaction, TransactionType, TxHash};
use ethers::types::H256;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Append-only, in-memory ledger
///
/// Keeps sealed blocks plus lookup indices by hash, sender, receiver,
/// custodian PID and (for genesis transactions) workflow id.
pub struct InMemoryLedger {
    node_id: String,
    state: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    blocks: Vec<Block>,
    /// Committed transactions in commit order
    order: Vec<TxHash>,
    by_hash: HashMap<TxHash, Transaction>,
    by_sender: HashMap<String, Vec<TxHash>>,
    by_receiver: HashMap<String, Vec<TxHash>>,
    by_in_charge: HashMap<String, Vec<TxHash>>,
    genesis_by_workflow: HashMap<String, Vec<TxHash>>,
    /// (sender, receiver, previous_transaction) of committed tasks
    continuations: HashMap<(String, String, TxHash), Vec<TxHash>>,
}

impl LedgerState {
    fn resolve(&self, hashes: Option<&Vec<TxHash>>) -> Vec<Transaction> {
        hashes
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|hash| self.by_hash.get(hash).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn index(&mut self, tx: Transaction) {
        let hash = tx.hash();
        self.order.push(hash);
        self.by_sender.entry(tx.sender().to_string()).or_default().push(hash);
        self.by_receiver.entry(tx.receiver().to_string()).or_default().push(hash);
        if let Some(pid) = tx.in_charge() {
            self.by_in_charge.entry(pid.to_string()).or_default().push(hash);
        }
        if let Some(previous) = tx.previous_transaction() {
            self.continuations
                .entry((tx.sender().to_string(), tx.receiver().to_string(), previous))
                .or_default()
                .push(hash);
        }
        if tx.transaction_type() == TransactionType::Workflow {
            if let Some(workflow_id) = tx.workflow_id() {
                self.genesis_by_workflow
                    .entry(workflow_id.to_string())
                    .or_default()
                    .push(hash);
            }
        }
        self.by_hash.insert(hash, tx);
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger whose blocks are attributed to `node_id`
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Seal `transactions` into the next block and index them
    ///
    /// Transactions already on the ledger are skipped, so a block never
    /// holds a second copy of a committed transaction.
    ///
    /// # Returns
    /// The sealed block (possibly empty if every transaction was a repeat)
    pub fn commit(&self, transactions: Vec<Transaction>) -> Block {
        let mut state = self.state.write();

        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(transactions.len());
        for tx in transactions {
            if state.by_hash.contains_key(&tx.hash()) || !seen.insert(tx.hash()) {
                warn!("Transaction {:?} is already committed, skipping", tx.hash());
                continue;
            }
            fresh.push(tx);
        }

        let number = state.blocks.len() as u64 + 1;
        let predecessor_hash = state.blocks.last().map(Block::hash).unwrap_or_else(H256::zero);
        let block = Block::seal(number, predecessor_hash, &self.node_id, fresh);

        for tx in &block.transactions {
            state.index(tx.clone());
        }
        state.blocks.push(block.clone());

        info!(
            "Block #{} sealed with {} transactions",
            block.number,
            block.transactions.len()
        );
        block
    }

    /// Number of sealed blocks
    pub fn height(&self) -> u64 {
        self.state.read().blocks.len() as u64
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.state.read().by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerView for InMemoryLedger {
    fn get_transaction(&self, hash: &TxHash) -> Option<Transaction> {
        self.state.read().by_hash.get(hash).cloned()
    }

    fn get_all_transactions(&self) -> Vec<Transaction> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|hash| state.by_hash.get(hash).cloned())
            .collect()
    }

    fn search_by_sender(&self, public_key: &str) -> Vec<Transaction> {
        let state = self.state.read();
        state.resolve(state.by_sender.get(public_key))
    }

    fn search_by_receiver(&self, public_key: &str) -> Vec<Transaction> {
        let state = self.state.read();
        state.resolve(state.by_receiver.get(public_key))
    }

    fn find_workflow_transactions(&self, workflow_id: &str) -> Vec<Transaction> {
        let state = self.state.read();
        state.resolve(state.genesis_by_workflow.get(workflow_id))
    }

    fn find_continuations(&self, sender: &str, receiver: &str, previous: &TxHash) -> Vec<Transaction> {
        let state = self.state.read();
        let key = (sender.to_string(), receiver.to_string(), *previous);
        state.resolve(state.continuations.get(&key))
    }

    fn transactions_in_charge(&self, pid: &str) -> Vec<Transaction> {
        let state = self.state.read();
        state.resolve(state.by_in_charge.get(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskPayload, WorkflowPayload};
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    fn genesis(workflow_id: &str) -> Transaction {
        Transaction::workflow(
            "alice",
            "alice",
            WorkflowPayload {
                workflow_id: workflow_id.to_string(),
                document: BTreeMap::from([("title".to_string(), json!("draft"))]),
                processes: BTreeMap::new(),
                permissions: BTreeMap::new(),
                in_charge: "alice_0".to_string(),
            },
        )
    }

    #[test]
    fn test_commit_chains_blocks() {
        let ledger = InMemoryLedger::new("node-1");

        let first = ledger.commit(vec![genesis("W1")]);
        let second = ledger.commit(vec![genesis("W2")]);

        assert_eq!(first.number, 1);
        assert_eq!(first.predecessor_hash, H256::zero());
        assert_eq!(second.number, 2);
        assert_eq!(second.predecessor_hash, first.hash());
        assert_eq!(second.creator_id, "node-1");
        assert_eq!(ledger.height(), 2);
    }

    #[test]
    fn test_commit_skips_repeats() {
        let ledger = InMemoryLedger::new("node-1");
        let tx = genesis("W1");

        let block = ledger.commit(vec![tx.clone(), tx.clone()]);
        assert_eq!(block.transactions.len(), 1);

        let again = ledger.commit(vec![tx]);
        assert!(again.transactions.is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_indices() {
        let ledger = InMemoryLedger::new("node-1");
        let first = genesis("W1");
        let task = Transaction::task(
            "alice",
            "bob",
            TaskPayload {
                workflow_id: "W1".to_string(),
                previous_transaction: first.hash(),
                workflow_transaction: first.hash(),
                in_charge: "bob_1".to_string(),
                document: BTreeMap::new(),
            },
        );
        let plain = Transaction::plain("carol", "bob", Map::new());
        ledger.commit(vec![first.clone(), task.clone(), plain.clone()]);

        assert_eq!(ledger.get_transaction(&task.hash()), Some(task.clone()));
        assert_eq!(ledger.search_by_sender("alice").len(), 2);
        assert_eq!(ledger.search_by_receiver("bob").len(), 2);
        assert_eq!(ledger.find_workflow_transactions("W1"), vec![first.clone()]);
        assert!(ledger.find_workflow_transactions("W2").is_empty());
        assert_eq!(ledger.transactions_in_charge("bob_1"), vec![task.clone()]);
        assert_eq!(ledger.find_continuations("alice", "bob", &first.hash()), vec![task]);
        assert!(ledger.find_continuations("bob", "alice", &first.hash()).is_empty());
        assert_eq!(ledger.get_all_transactions().len(), 3);
        assert_eq!(ledger.get_all_transactions()[2], plain);
    }

    /// Uses only the required methods, so lookups take the default scans
    struct Unindexed(InMemoryLedger);

    impl LedgerView for Unindexed {
        fn get_transaction(&self, hash: &TxHash) -> Option<Transaction> {
            self.0.get_transaction(hash)
        }

        fn get_all_transactions(&self) -> Vec<Transaction> {
            self.0.get_all_transactions()
        }

        fn search_by_sender(&self, public_key: &str) -> Vec<Transaction> {
            self.0.search_by_sender(public_key)
        }

        fn search_by_receiver(&self, public_key: &str) -> Vec<Transaction> {
            self.0.search_by_receiver(public_key)
        }
    }

    #[test]
    fn test_indexed_lookups_match_default_scans() {
        let ledger = InMemoryLedger::new("node-1");
        let first = genesis("W1");
        let tasks: Vec<Transaction> = ["bob", "carol"]
            .iter()
            .map(|receiver| {
                Transaction::task(
                    "alice",
                    *receiver,
                    TaskPayload {
                        workflow_id: "W1".to_string(),
                        previous_transaction: first.hash(),
                        workflow_transaction: first.hash(),
                        in_charge: format!("{receiver}_1"),
                        document: BTreeMap::new(),
                    },
                )
            })
            .collect();
        ledger.commit(vec![first.clone()]);
        ledger.commit(tasks);
        let scanned = Unindexed(ledger);
        let indexed = &scanned.0;

        for receiver in ["alice", "bob", "carol"] {
            assert_eq!(
                indexed.find_continuations("alice", receiver, &first.hash()),
                scanned.find_continuations("alice", receiver, &first.hash())
            );
        }
        assert_eq!(
            indexed.find_workflow_transactions("W1"),
            scanned.find_workflow_transactions("W1")
        );
        assert_eq!(
            indexed.transactions_in_charge("carol_1"),
            scanned.transactions_in_charge("carol_1")
        );
    }
}
