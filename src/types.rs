use crate::crypto::{digest, CryptoError, CryptoProvider};
use crate::identity::MalformedPidError;
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Hash identifying a transaction on the ledger
pub type TxHash = H256;

/// Document attribute name -> value
pub type Document = BTreeMap<String, Value>;

/// Payload key carrying the transaction kind discriminant
pub const TRANSACTION_TYPE_KEY: &str = "transaction_type";

/// Transaction kind discriminant as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// `"0"`: plain signed transfer, no workflow semantics
    Plain,
    /// `"1"`: genesis record of a workflow
    Workflow,
    /// `"2"`: custody handover within a workflow
    Task,
}

impl TransactionType {
    pub fn code(&self) -> &'static str {
        match self {
            TransactionType::Plain => "0",
            TransactionType::Workflow => "1",
            TransactionType::Task => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(TransactionType::Plain),
            "1" => Some(TransactionType::Workflow),
            "2" => Some(TransactionType::Task),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind-specific fields of a genesis (workflow) transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPayload {
    pub workflow_id: String,
    /// Initial document: attribute name -> value
    pub document: Document,
    /// Process graph: PID -> PIDs it may hand the document to
    pub processes: BTreeMap<String, Vec<String>>,
    /// Attribute name -> PIDs allowed to write it
    pub permissions: BTreeMap<String, Vec<String>>,
    /// Initial custodian, the predecessor custodian of the first task
    pub in_charge: String,
}

/// Kind-specific fields of a task transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub workflow_id: String,
    pub previous_transaction: TxHash,
    pub workflow_transaction: TxHash,
    /// PID of the new custodian
    pub in_charge: String,
    /// Attributes this transaction writes
    pub document: Document,
}

/// Typed view of a transaction payload
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionKind {
    Plain,
    Workflow(WorkflowPayload),
    Task(TaskPayload),
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionKind::Plain => TransactionType::Plain,
            TransactionKind::Workflow(_) => TransactionType::Workflow,
            TransactionKind::Task(_) => TransactionType::Task,
        }
    }
}

/// Errors turning a wire transaction into a typed one
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown transaction type {0}")]
    UnknownTransactionType(String),
    #[error("invalid payload for transaction type {kind}: {source}")]
    InvalidPayload {
        kind: TransactionType,
        #[source]
        source: serde_json::Error,
    },
}

/// Structure of a transaction as exchanged with other components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTransaction {
    pub sender: String,
    pub receiver: String,
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Signed ledger transaction
///
/// The raw payload object is kept next to its typed view so the exact
/// signed bytes can be rebuilt even when the payload carries fields the
/// typed view does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireTransaction", into = "WireTransaction")]
pub struct Transaction {
    sender: String,
    receiver: String,
    payload: Map<String, Value>,
    kind: TransactionKind,
    signature: Option<String>,
    hash: TxHash,
}

impl Transaction {
    /// Plain transaction carrying an arbitrary payload
    pub fn plain(sender: impl Into<String>, receiver: impl Into<String>, mut payload: Map<String, Value>) -> Self {
        payload.insert(
            TRANSACTION_TYPE_KEY.to_string(),
            json!(TransactionType::Plain.code()),
        );
        Self::assemble(sender.into(), receiver.into(), payload, TransactionKind::Plain, None)
    }

    /// Genesis transaction of a new workflow
    pub fn workflow(sender: impl Into<String>, receiver: impl Into<String>, workflow: WorkflowPayload) -> Self {
        let mut payload = Map::new();
        payload.insert(TRANSACTION_TYPE_KEY.to_string(), json!(TransactionType::Workflow.code()));
        payload.insert("workflow_id".to_string(), json!(workflow.workflow_id));
        payload.insert("document".to_string(), json!(workflow.document));
        payload.insert("processes".to_string(), json!(workflow.processes));
        payload.insert("permissions".to_string(), json!(workflow.permissions));
        payload.insert("in_charge".to_string(), json!(workflow.in_charge));
        Self::assemble(
            sender.into(),
            receiver.into(),
            payload,
            TransactionKind::Workflow(workflow),
            None,
        )
    }

    /// Task transaction handing the document to a new custodian
    pub fn task(sender: impl Into<String>, receiver: impl Into<String>, task: TaskPayload) -> Self {
        let mut payload = Map::new();
        payload.insert(TRANSACTION_TYPE_KEY.to_string(), json!(TransactionType::Task.code()));
        payload.insert("workflow_id".to_string(), json!(task.workflow_id));
        payload.insert("previous_transaction".to_string(), json!(task.previous_transaction));
        payload.insert("workflow_transaction".to_string(), json!(task.workflow_transaction));
        payload.insert("in_charge".to_string(), json!(task.in_charge));
        payload.insert("document".to_string(), json!(task.document));
        Self::assemble(
            sender.into(),
            receiver.into(),
            payload,
            TransactionKind::Task(task),
            None,
        )
    }

    /// Decode the wire form, dispatching on `transaction_type`
    ///
    /// A payload without `transaction_type` is a plain transaction.
    pub fn from_wire(wire: WireTransaction) -> Result<Self, DecodeError> {
        let kind = match wire.payload.get(TRANSACTION_TYPE_KEY) {
            None => TransactionType::Plain,
            Some(Value::String(code)) => TransactionType::from_code(code)
                .ok_or_else(|| DecodeError::UnknownTransactionType(code.clone()))?,
            Some(other) => return Err(DecodeError::UnknownTransactionType(other.to_string())),
        };

        let object = Value::Object(wire.payload.clone());
        let kind = match kind {
            TransactionType::Plain => TransactionKind::Plain,
            TransactionType::Workflow => TransactionKind::Workflow(
                serde_json::from_value(object).map_err(|source| DecodeError::InvalidPayload { kind, source })?,
            ),
            TransactionType::Task => TransactionKind::Task(
                serde_json::from_value(object).map_err(|source| DecodeError::InvalidPayload { kind, source })?,
            ),
        };

        Ok(Self::assemble(
            wire.sender,
            wire.receiver,
            wire.payload,
            kind,
            wire.signature,
        ))
    }

    pub fn to_wire(&self) -> WireTransaction {
        WireTransaction {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            payload: self.payload.clone(),
            signature: self.signature.clone(),
        }
    }

    fn assemble(
        sender: String,
        receiver: String,
        payload: Map<String, Value>,
        kind: TransactionKind,
        signature: Option<String>,
    ) -> Self {
        let hash = digest(&signing_bytes(&sender, &receiver, &payload));
        Self {
            sender,
            receiver,
            payload,
            kind,
            signature,
            hash,
        }
    }

    /// Sign the canonical form with the sender's private key
    pub fn sign(&mut self, provider: &dyn CryptoProvider, private_key: &str) -> Result<(), CryptoError> {
        let signature = provider.sign(&self.signing_bytes(), private_key)?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Verify the signature against the sender's public key
    ///
    /// An unsigned transaction never verifies.
    pub fn validate_signature(&self, provider: &dyn CryptoProvider) -> bool {
        match &self.signature {
            Some(signature) => provider.verify(&self.signing_bytes(), signature, &self.sender),
            None => false,
        }
    }

    /// Exact bytes covered by the signature and the transaction hash
    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(&self.sender, &self.receiver, &self.payload)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind.transaction_type()
    }

    pub fn workflow_id(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::Workflow(workflow) => Some(&workflow.workflow_id),
            TransactionKind::Task(task) => Some(&task.workflow_id),
            TransactionKind::Plain => None,
        }
    }

    pub fn in_charge(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::Workflow(workflow) => Some(&workflow.in_charge),
            TransactionKind::Task(task) => Some(&task.in_charge),
            TransactionKind::Plain => None,
        }
    }

    pub fn previous_transaction(&self) -> Option<TxHash> {
        match &self.kind {
            TransactionKind::Task(task) => Some(task.previous_transaction),
            _ => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowPayload> {
        match &self.kind {
            TransactionKind::Workflow(workflow) => Some(workflow),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskPayload> {
        match &self.kind {
            TransactionKind::Task(task) => Some(task),
            _ => None,
        }
    }
}

impl TryFrom<WireTransaction> for Transaction {
    type Error = DecodeError;

    fn try_from(wire: WireTransaction) -> Result<Self, Self::Error> {
        Transaction::from_wire(wire)
    }
}

impl From<Transaction> for WireTransaction {
    fn from(tx: Transaction) -> Self {
        WireTransaction {
            sender: tx.sender,
            receiver: tx.receiver,
            payload: tx.payload,
            signature: tx.signature,
        }
    }
}

/// Compact JSON of `{payload, receiver, sender}` with every object's keys sorted
fn signing_bytes(sender: &str, receiver: &str, payload: &Map<String, Value>) -> Vec<u8> {
    let mut envelope = Map::new();
    envelope.insert("sender".to_string(), Value::String(sender.to_string()));
    envelope.insert("receiver".to_string(), Value::String(receiver.to_string()));
    envelope.insert("payload".to_string(), Value::Object(payload.clone()));

    let mut out = String::new();
    write_canonical(&Value::Object(envelope), &mut out);
    out.into_bytes()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Ledger integrity failure: a task references a predecessor the ledger lacks
///
/// Distinct from an ordinary rejection. Retrying the same input cannot help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("corrupted chain: previous transaction {missing:?} not found")]
pub struct CorruptedChainError {
    pub missing: TxHash,
}

/// Validation errors
///
/// Every variant except `CorruptedChain` is an ordinary rejection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    CorruptedChain(#[from] CorruptedChainError),

    #[error("wrong transaction type: expected {expected}, got {found}")]
    WrongTransactionType {
        expected: TransactionType,
        found: TransactionType,
    },

    #[error("workflow transaction {reference:?} not found")]
    UnknownWorkflowTransaction { reference: TxHash },

    #[error("workflow id {own} does not match previous ({previous:?}) and genesis ({genesis:?})")]
    WorkflowIdMismatch {
        own: String,
        previous: Option<String>,
        genesis: Option<String>,
    },

    #[error("sender is not the receiver of the previous transaction")]
    CustodyBroken,

    #[error("sender is not the current owner of the document flow")]
    NotInCharge,

    #[error("receiver does not correspond to in_charge {in_charge}")]
    ReceiverMismatch { in_charge: String },

    #[error("no write permission for attribute {attribute}")]
    WritePermissionDenied { attribute: String },

    #[error("handover from {from} to {to} is not in the process definition")]
    ProcessViolation { from: String, to: String },

    #[error("a transaction already continues {previous:?} for this sender and receiver")]
    DuplicateTransaction { previous: TxHash },

    #[error("workflow id {workflow_id} is already taken")]
    DuplicateWorkflowId { workflow_id: String },

    #[error("permission attribute {attribute} is not part of the document")]
    UnknownPermissionAttribute { attribute: String },

    #[error("malformed PID {pid}: {reason}")]
    MalformedPid {
        pid: String,
        reason: MalformedPidError,
    },

    #[error("invalid transaction signature")]
    InvalidSignature,
}

impl ValidationError {
    /// Whether this is the structural tier rather than a rejection
    pub fn is_corruption(&self) -> bool {
        matches!(self, ValidationError::CorruptedChain(_))
    }

    /// Short stable code naming the failed rule, used in logs
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::CorruptedChain(_) => "corrupted_chain",
            ValidationError::WrongTransactionType { .. } => "wrong_transaction_type",
            ValidationError::UnknownWorkflowTransaction { .. } => "unknown_workflow_transaction",
            ValidationError::WorkflowIdMismatch { .. } => "workflow_id_mismatch",
            ValidationError::CustodyBroken => "custody_broken",
            ValidationError::NotInCharge => "not_in_charge",
            ValidationError::ReceiverMismatch { .. } => "receiver_mismatch",
            ValidationError::WritePermissionDenied { .. } => "write_permission_denied",
            ValidationError::ProcessViolation { .. } => "process_violation",
            ValidationError::DuplicateTransaction { .. } => "duplicate_transaction",
            ValidationError::DuplicateWorkflowId { .. } => "duplicate_workflow_id",
            ValidationError::UnknownPermissionAttribute { .. } => "unknown_permission_attribute",
            ValidationError::MalformedPid { .. } => "malformed_pid",
            ValidationError::InvalidSignature => "invalid_signature",
        }
    }
}

/// Soft confirmation returned to submitters after validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftConfirmation {
    pub tx_hash: TxHash,
    pub status: ConfirmationStatus,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Accepted,
    Rejected { reason: String },
}
