use doc_ledger::{
    config::Config,
    crypto::{CryptoProvider, KeyPair, Secp256k1Provider},
    identity::format_pid,
    ledger::{custody_chain, LedgerView},
    node::{replay, ImportFile},
    ConfirmationStatus, Node, TaskPayload, Transaction, WorkflowPayload,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/default.toml";

/// The main entry point for the ledger node.
///
/// Usage: `doc-ledger [CONFIG.toml] [keygen | demo | import [FILE]]`
///
/// Loads the configuration, initializes logging and runs the requested
/// command. Without a command a short demo workflow is run.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config_path = DEFAULT_CONFIG.to_string();
    let mut rest = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg.ends_with(".toml") {
            config_path = arg;
        } else {
            rest.push(arg);
        }
    }

    // Load the configuration; a missing default file means defaults
    let config = if config_path == DEFAULT_CONFIG && !std::path::Path::new(DEFAULT_CONFIG).exists() {
        Config::default()
    } else {
        Config::load(&config_path)?
    };

    // RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Ledger node starting with config: {:?}", config);

    let provider: Arc<dyn CryptoProvider> = Arc::new(Secp256k1Provider::new());

    match rest.first().map(String::as_str) {
        Some("keygen") => keygen(provider.as_ref()),
        Some("import") => {
            let path = rest
                .get(1)
                .cloned()
                .or_else(|| config.import.path.clone())
                .ok_or_else(|| anyhow::anyhow!("no import file given and [import] path is not set"))?;
            let file = ImportFile::load(&path)?;
            let node = Node::new(&config, provider);
            let summary = replay(&node, file).await;
            info!(
                "Ledger holds {} transactions in {} blocks ({} accepted, {} rejected, {} failed)",
                node.ledger().len(),
                node.ledger().height(),
                summary.accepted,
                summary.rejected,
                summary.failed
            );
        }
        Some("demo") | None => demo(&config, provider).await?,
        Some(other) => anyhow::bail!("unknown command {other}; expected keygen, demo or import"),
    }

    Ok(())
}

/// Print a fresh key pair and its first PID
fn keygen(provider: &dyn CryptoProvider) {
    let keys = provider.generate_key_pair();
    println!("private_key: {}", keys.private_key);
    println!("public_key:  {}", keys.public_key);
    println!("pid:         {}", format_pid(&keys.public_key, 0));
}

fn sign(provider: &dyn CryptoProvider, mut tx: Transaction, keys: &KeyPair) -> anyhow::Result<Transaction> {
    tx.sign(provider, &keys.private_key)?;
    Ok(tx)
}

/// Run a three-party workflow, attempt a fork, and print the custody chain
async fn demo(config: &Config, provider: Arc<dyn CryptoProvider>) -> anyhow::Result<()> {
    let node = Node::new(config, Arc::clone(&provider));
    let author = provider.generate_key_pair();
    let reviewer = provider.generate_key_pair();
    let approver = provider.generate_key_pair();
    let author_pid = format_pid(&author.public_key, 0);
    let reviewer_pid = format_pid(&reviewer.public_key, 1);
    let approver_pid = format_pid(&approver.public_key, 2);

    let genesis = sign(
        provider.as_ref(),
        Transaction::workflow(
            author.public_key.clone(),
            author.public_key.clone(),
            WorkflowPayload {
                workflow_id: "demo-contract".to_string(),
                document: BTreeMap::from([
                    ("title".to_string(), json!("Supply contract")),
                    ("approved".to_string(), json!(false)),
                ]),
                processes: BTreeMap::from([
                    (author_pid.clone(), vec![reviewer_pid.clone()]),
                    (reviewer_pid.clone(), vec![approver_pid.clone()]),
                ]),
                permissions: BTreeMap::from([
                    ("title".to_string(), vec![author_pid.clone(), reviewer_pid.clone()]),
                    ("approved".to_string(), vec![reviewer_pid.clone()]),
                ]),
                in_charge: author_pid,
            },
        ),
        &author,
    )?;
    submit_and_seal(&node, genesis.clone()).await?;

    let review = sign(
        provider.as_ref(),
        Transaction::task(
            author.public_key.clone(),
            reviewer.public_key.clone(),
            TaskPayload {
                workflow_id: "demo-contract".to_string(),
                previous_transaction: genesis.hash(),
                workflow_transaction: genesis.hash(),
                in_charge: reviewer_pid.clone(),
                document: BTreeMap::from([("title".to_string(), json!("Supply contract v2"))]),
            },
        ),
        &author,
    )?;
    submit_and_seal(&node, review.clone()).await?;

    // Handing the same document to the reviewer twice is a fork
    let fork = sign(
        provider.as_ref(),
        Transaction::task(
            author.public_key.clone(),
            reviewer.public_key.clone(),
            TaskPayload {
                workflow_id: "demo-contract".to_string(),
                previous_transaction: genesis.hash(),
                workflow_transaction: genesis.hash(),
                in_charge: reviewer_pid.clone(),
                document: BTreeMap::from([("title".to_string(), json!("Supply contract v3"))]),
            },
        ),
        &author,
    )?;
    submit_and_seal(&node, fork).await?;

    let approval = sign(
        provider.as_ref(),
        Transaction::task(
            reviewer.public_key.clone(),
            approver.public_key.clone(),
            TaskPayload {
                workflow_id: "demo-contract".to_string(),
                previous_transaction: review.hash(),
                workflow_transaction: genesis.hash(),
                in_charge: approver_pid.clone(),
                document: BTreeMap::from([("approved".to_string(), json!(true))]),
            },
        ),
        &reviewer,
    )?;
    submit_and_seal(&node, approval.clone()).await?;

    for (depth, tx) in custody_chain(node.ledger(), approval.hash())?.iter().enumerate() {
        info!(
            "custody[{}]: {:?} type {} {} -> {}",
            depth,
            tx.hash(),
            tx.transaction_type(),
            tx.sender(),
            tx.receiver()
        );
    }
    for tx in node.ledger().transactions_in_charge(&approver_pid) {
        info!("Approver holds {:?}", tx.hash());
    }

    Ok(())
}

async fn submit_and_seal(node: &Node, tx: Transaction) -> anyhow::Result<()> {
    let confirmation = node.submit(tx).await?;
    match confirmation.status {
        ConfirmationStatus::Accepted => {
            node.seal_block();
        }
        ConfirmationStatus::Rejected { reason } => {
            warn!("Transaction {:?} rejected: {}", confirmation.tx_hash, reason);
        }
    }
    Ok(())
}
