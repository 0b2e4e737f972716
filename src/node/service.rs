//! Node Service
//!
//! Accepts transactions, validates them off the async runtime, adds admitted
//! ones to the pending pool and seals pending transactions into blocks.
//!
//! # Flow
//! 1. Decode the wire form into a typed `Transaction`
//! 2. Validate it on a blocking worker (validation takes synchronous locks)
//! 3. Admitted: add to the pool and return an accepted `SoftConfirmation`
//! 4. Rejected: return a rejected `SoftConfirmation` naming the reason
//! 5. `seal_block` moves pending transactions into the ledger and releases
//!    their admission reservations

use crate::{
    config::Config,
    crypto::CryptoProvider,
    ledger::{Block, InMemoryLedger},
    pool::TransactionPool,
    validation::Validator,
    ConfirmationStatus, CorruptedChainError, SoftConfirmation, Transaction, TxHash, ValidationError,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error, info};

/// Errors surfaced to a submitter
///
/// Ordinary rule failures are not errors here; they come back as a rejected
/// confirmation.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid transaction: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    CorruptedChain(#[from] CorruptedChainError),

    #[error("validation worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Single ledger node
pub struct Node {
    config: Config,
    provider: Arc<dyn CryptoProvider>,
    validator: Arc<Validator>,
    pool: Arc<TransactionPool>,
    ledger: Arc<InMemoryLedger>,
}

impl Node {
    /// Creates a node with an empty ledger and pool
    ///
    /// # Arguments
    /// * `config` - Node configuration (lock mode, block size, node id)
    /// * `provider` - Crypto provider shared with the validator
    pub fn new(config: &Config, provider: Arc<dyn CryptoProvider>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new(config.ledger.node_id.clone()));
        let pool = Arc::new(TransactionPool::new());
        let validator = Arc::new(Validator::new(
            Arc::clone(&provider),
            ledger.clone(),
            pool.clone(),
            config.validation.lock_mode,
        ));

        Self {
            config: config.clone(),
            provider,
            validator,
            pool,
            ledger,
        }
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        self.provider.as_ref()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    /// Submit a transaction in wire form
    pub async fn submit_json(&self, value: Value) -> Result<SoftConfirmation, SubmitError> {
        let tx: Transaction = serde_json::from_value(value).map_err(|e| {
            error!("Failed to deserialize transaction: {}", e);
            e
        })?;
        self.submit(tx).await
    }

    /// Validate a transaction and, if admitted, add it to the pending pool
    ///
    /// Validation and the pool insert run in one blocking task, so dropping
    /// the returned future (for example on a caller's timeout) can never
    /// leave an admission claim without a pending transaction behind it.
    ///
    /// # Returns
    /// * `Ok(SoftConfirmation)` accepted or rejected with the failed rule
    /// * `Err(SubmitError::CorruptedChain)` if the transaction references a
    ///   predecessor the ledger does not have
    pub async fn submit(&self, tx: Transaction) -> Result<SoftConfirmation, SubmitError> {
        let tx_hash = tx.hash();
        info!("Processing transaction {:?} from {}", tx_hash, tx.sender());

        // Validation blocks on the workflow lock, keep it off the runtime
        let validator = Arc::clone(&self.validator);
        let pool = Arc::clone(&self.pool);
        let outcome = tokio::task::spawn_blocking(move || -> Result<(), ValidationError> {
            validator.validate(&tx)?;
            if pool.add(tx) {
                info!("Transaction {:?} added to pool", tx_hash);
            } else {
                debug!("Transaction {:?} already pending", tx_hash);
            }
            Ok(())
        })
        .await?;

        let status = match outcome {
            Ok(()) => ConfirmationStatus::Accepted,
            Err(ValidationError::CorruptedChain(e)) => return Err(e.into()),
            Err(e) => ConfirmationStatus::Rejected {
                reason: e.to_string(),
            },
        };

        Ok(SoftConfirmation {
            tx_hash,
            status,
            timestamp: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
        })
    }

    /// Seal up to `max_block_size` pending transactions into a block
    ///
    /// # Returns
    /// The sealed block, or `None` if nothing was pending
    pub fn seal_block(&self) -> Option<Block> {
        let pending = self.pool.take_pending(self.config.ledger.max_block_size);
        if pending.is_empty() {
            debug!("No pending transactions to seal");
            return None;
        }

        let hashes: Vec<TxHash> = pending.iter().map(Transaction::hash).collect();
        let block = self.ledger.commit(pending);

        // Committed state now carries the claims
        for hash in &hashes {
            self.validator.release(hash);
        }

        debug!(
            "Released reservations of {} transactions in block #{}",
            hashes.len(),
            block.number
        );
        Some(block)
    }

    /// Drop a pending transaction without committing it
    pub fn discard(&self, hash: &TxHash) -> Option<Transaction> {
        let removed = self.pool.remove(hash);
        self.validator.release(hash);
        if removed.is_some() {
            info!("Transaction {:?} discarded", hash);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{CryptoError, KeyPair, Secp256k1Provider},
        identity::format_pid,
        ledger::LedgerView,
        TaskPayload, WorkflowPayload,
    };
    use ethers::types::H256;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Secp256k1 provider whose signature checks take a while
    #[derive(Default)]
    struct SlowVerify(Secp256k1Provider);

    impl CryptoProvider for SlowVerify {
        fn sign(&self, data: &[u8], private_key: &str) -> Result<String, CryptoError> {
            self.0.sign(data, private_key)
        }

        fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> bool {
            std::thread::sleep(Duration::from_millis(200));
            self.0.verify(data, signature, public_key)
        }

        fn hash(&self, data: &[u8]) -> H256 {
            self.0.hash(data)
        }

        fn import_public_key(&self, decoded: &[u8]) -> Result<String, CryptoError> {
            self.0.import_public_key(decoded)
        }

        fn generate_key_pair(&self) -> KeyPair {
            self.0.generate_key_pair()
        }
    }

    fn node(max_block_size: usize) -> Node {
        let mut config = Config::default();
        config.ledger.max_block_size = max_block_size;
        Node::new(&config, Arc::new(Secp256k1Provider::new()))
    }

    fn signed(node: &Node, mut tx: Transaction, keys: &KeyPair) -> Transaction {
        tx.sign(node.provider(), &keys.private_key).unwrap();
        tx
    }

    fn genesis(node: &Node, alice: &KeyPair, bob: &KeyPair, workflow_id: &str) -> Transaction {
        let a = format_pid(&alice.public_key, 0);
        let b = format_pid(&bob.public_key, 1);
        let tx = Transaction::workflow(
            alice.public_key.clone(),
            alice.public_key.clone(),
            WorkflowPayload {
                workflow_id: workflow_id.to_string(),
                document: BTreeMap::from([("title".to_string(), json!("draft"))]),
                processes: BTreeMap::from([(a.clone(), vec![b])]),
                permissions: BTreeMap::from([("title".to_string(), vec![a.clone()])]),
                in_charge: a,
            },
        );
        signed(node, tx, alice)
    }

    fn handover(node: &Node, alice: &KeyPair, bob: &KeyPair, genesis: &Transaction, title: &str) -> Transaction {
        let tx = Transaction::task(
            alice.public_key.clone(),
            bob.public_key.clone(),
            TaskPayload {
                workflow_id: genesis.workflow_id().unwrap().to_string(),
                previous_transaction: genesis.hash(),
                workflow_transaction: genesis.hash(),
                in_charge: format_pid(&bob.public_key, 1),
                document: BTreeMap::from([("title".to_string(), json!(title))]),
            },
        );
        signed(node, tx, alice)
    }

    #[tokio::test]
    async fn test_submit_and_seal() {
        let node = node(10);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let genesis = genesis(&node, &alice, &bob, "W1");

        let confirmation = node.submit(genesis.clone()).await.unwrap();
        assert_eq!(confirmation.status, ConfirmationStatus::Accepted);
        assert_eq!(confirmation.tx_hash, genesis.hash());
        assert!(node.pool().contains(&genesis.hash()));

        let block = node.seal_block().unwrap();
        assert_eq!(block.number, 1);
        assert_eq!(block.creator_id, "node-1");
        assert!(node.pool().is_empty());
        assert!(node.ledger().get_transaction(&genesis.hash()).is_some());
        assert_eq!(node.validator().reservations(), 0);
        assert!(node.seal_block().is_none());
    }

    #[tokio::test]
    async fn test_rejection_is_a_confirmation() {
        let node = node(10);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let mut wire = genesis(&node, &alice, &bob, "W1").to_wire();
        wire.signature = None;

        let confirmation = node.submit(Transaction::from_wire(wire).unwrap()).await.unwrap();

        assert!(matches!(confirmation.status, ConfirmationStatus::Rejected { .. }));
        assert!(node.pool().is_empty());
    }

    #[tokio::test]
    async fn test_missing_predecessor_is_an_error() {
        let node = node(10);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let genesis = genesis(&node, &alice, &bob, "W1");

        let result = node.submit(handover(&node, &alice, &bob, &genesis, "final")).await;

        assert!(matches!(result, Err(SubmitError::CorruptedChain(_))));
    }

    #[tokio::test]
    async fn test_submit_json_rejects_unknown_type() {
        let node = node(10);

        let result = node
            .submit_json(json!({
                "sender": "a",
                "receiver": "b",
                "payload": {"transaction_type": "7"},
            }))
            .await;

        assert!(matches!(result, Err(SubmitError::Decode(_))));
    }

    #[tokio::test]
    async fn test_submit_json_round_trips_wire_form() {
        let node = node(10);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let genesis = genesis(&node, &alice, &bob, "W1");

        let confirmation = node
            .submit_json(serde_json::to_value(&genesis).unwrap())
            .await
            .unwrap();

        assert_eq!(confirmation.status, ConfirmationStatus::Accepted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_forks_admit_one() {
        let node = Arc::new(node(10));
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let genesis = genesis(&node, &alice, &bob, "W1");
        node.submit(genesis.clone()).await.unwrap();
        node.seal_block().unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let node = Arc::clone(&node);
            let tx = handover(&node, &alice, &bob, &genesis, &format!("version {i}"));
            handles.push(tokio::spawn(async move { node.submit(tx).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            let confirmation = handle.await.unwrap().unwrap();
            if confirmation.status == ConfirmationStatus::Accepted {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(node.pool().len(), 1);

        node.seal_block().unwrap();
        let late = handover(&node, &alice, &bob, &genesis, "late");
        let confirmation = node.submit(late).await.unwrap();
        assert!(matches!(confirmation.status, ConfirmationStatus::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_block_size_limit() {
        let node = node(1);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        node.submit(genesis(&node, &alice, &bob, "W1")).await.unwrap();
        node.submit(genesis(&node, &alice, &bob, "W2")).await.unwrap();

        assert_eq!(node.seal_block().unwrap().transactions.len(), 1);
        assert_eq!(node.seal_block().unwrap().number, 2);
        assert_eq!(node.ledger().height(), 2);
    }

    #[tokio::test]
    async fn test_discard_frees_the_workflow_id() {
        let node = node(10);
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let first = genesis(&node, &alice, &bob, "W1");
        node.submit(first.clone()).await.unwrap();

        assert!(node.discard(&first.hash()).is_some());
        assert_eq!(node.validator().reservations(), 0);

        let mut payload = first.as_workflow().unwrap().clone();
        payload.document.insert("title".to_string(), json!("second draft"));
        let second = signed(
            &node,
            Transaction::workflow(alice.public_key.clone(), alice.public_key.clone(), payload),
            &alice,
        );
        let confirmation = node.submit(second).await.unwrap();
        assert_eq!(confirmation.status, ConfirmationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_abandoned_submission_still_reaches_the_pool() {
        let node = Node::new(&Config::default(), Arc::new(SlowVerify::default()));
        let alice = node.provider().generate_key_pair();
        let bob = node.provider().generate_key_pair();
        let first = genesis(&node, &alice, &bob, "W1");

        let abandoned = tokio::time::timeout(Duration::from_millis(50), node.submit(first.clone())).await;
        assert!(abandoned.is_err());

        // The blocking worker finishes after the caller gave up
        for _ in 0..100 {
            if node.pool().contains(&first.hash()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(node.pool().contains(&first.hash()));
        assert_eq!(node.validator().reservations(), 1);

        node.seal_block().unwrap();
        assert_eq!(node.validator().reservations(), 0);
        assert!(node.ledger().get_transaction(&first.hash()).is_some());
    }
}
