use super::locks::{LockMode, LockRegistry, ReservationKey, Reservations};
use crate::{
    crypto::CryptoProvider,
    identity::{key_component, Pid},
    ledger::LedgerView,
    pool::PendingPoolView,
    CorruptedChainError, TaskPayload, Transaction, TransactionKind, TransactionType, TxHash,
    ValidationError, WorkflowPayload,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Admission check for transactions against committed and pending state
///
/// Rule checks that read shared state run under the lock for the
/// transaction's workflow. The signature check runs with the lock released,
/// and only a fully checked transaction claims its fork key or workflow id.
pub struct Validator {
    provider: Arc<dyn CryptoProvider>,
    ledger: Arc<dyn LedgerView>,
    pool: Arc<dyn PendingPoolView>,
    locks: LockRegistry,
    reservations: Reservations,
}

impl Validator {
    pub fn new(
        provider: Arc<dyn CryptoProvider>,
        ledger: Arc<dyn LedgerView>,
        pool: Arc<dyn PendingPoolView>,
        lock_mode: LockMode,
    ) -> Self {
        Self {
            provider,
            ledger,
            pool,
            locks: LockRegistry::new(lock_mode),
            reservations: Reservations::new(),
        }
    }

    /// Validate a transaction of any kind
    ///
    /// Dispatches on the transaction kind. Plain transactions only need a
    /// valid signature.
    ///
    /// # Returns
    /// * `Ok(())` if the transaction may be admitted
    /// * `Err(ValidationError::CorruptedChain)` if a task references a
    ///   predecessor missing from the ledger
    /// * `Err(_)` naming the first failed rule otherwise
    pub fn validate(&self, tx: &Transaction) -> Result<(), ValidationError> {
        debug!("Validating transaction {:?} of type {}", tx.hash(), tx.transaction_type());

        let result = match tx.kind() {
            TransactionKind::Workflow(_) => self.validate_workflow(tx),
            TransactionKind::Task(_) => self.validate_task(tx),
            TransactionKind::Plain => self.check_signature(tx),
        };

        match &result {
            Ok(()) => debug!("Transaction {:?} validation successful", tx.hash()),
            Err(e) if e.is_corruption() => {
                error!(tx = ?tx.hash(), reason = e.reason(), "Corrupted transaction: {}", e)
            }
            Err(e) => warn!(tx = ?tx.hash(), reason = e.reason(), "Transaction rejected: {}", e),
        }
        result
    }

    /// Boolean form of `validate`
    ///
    /// Rejections become `Ok(false)`; only a broken chain is an error.
    pub fn is_valid(&self, tx: &Transaction) -> Result<bool, CorruptedChainError> {
        match self.validate(tx) {
            Ok(()) => Ok(true),
            Err(ValidationError::CorruptedChain(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Drop the reservations held by a transaction
    ///
    /// Call once the transaction is committed or discarded.
    pub fn release(&self, hash: &TxHash) {
        self.reservations.release(hash);
    }

    /// Number of reservations currently held
    pub fn reservations(&self) -> usize {
        self.reservations.len()
    }

    /// Validate a task transaction
    ///
    /// Rules run first so a rule failure is reported without looking at the
    /// signature. The fork key is only claimed after the PID and signature
    /// checks pass, under a second critical section that re-runs the rules
    /// against the state at that point.
    pub fn validate_task(&self, tx: &Transaction) -> Result<(), ValidationError> {
        let TransactionKind::Task(task) = tx.kind() else {
            return Err(ValidationError::WrongTransactionType {
                expected: TransactionType::Task,
                found: tx.transaction_type(),
            });
        };
        let key = ReservationKey::Fork {
            workflow_id: task.workflow_id.clone(),
            sender: tx.sender().to_string(),
            receiver: tx.receiver().to_string(),
            previous: task.previous_transaction,
        };

        self.locked(&task.workflow_id, || self.check_task_rules(tx, task, &key))?;
        self.check_common(tx, &task.in_charge)?;
        self.locked(&task.workflow_id, || {
            self.check_task_rules(tx, task, &key)?;
            self.reservations.reserve(key.clone(), tx.hash());
            Ok(())
        })
    }

    /// Validate a genesis transaction
    ///
    /// Same phases as `validate_task`, claiming the workflow id.
    pub fn validate_workflow(&self, tx: &Transaction) -> Result<(), ValidationError> {
        let TransactionKind::Workflow(workflow) = tx.kind() else {
            return Err(ValidationError::WrongTransactionType {
                expected: TransactionType::Workflow,
                found: tx.transaction_type(),
            });
        };
        let key = ReservationKey::Workflow(workflow.workflow_id.clone());

        self.locked(&workflow.workflow_id, || self.check_workflow_rules(tx, workflow, &key))?;
        self.check_common(tx, &workflow.in_charge)?;
        self.locked(&workflow.workflow_id, || {
            self.check_workflow_rules(tx, workflow, &key)?;
            self.reservations.reserve(key.clone(), tx.hash());
            Ok(())
        })
    }

    /// Run `f` inside the critical section for `workflow_id`
    ///
    /// The guard is dropped on every exit path of `f`.
    fn locked<T>(&self, workflow_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock_for(workflow_id);
        let _guard = lock.lock();
        f()
    }

    /// Custody, permission, process and fork rules of a task
    fn check_task_rules(
        &self,
        tx: &Transaction,
        task: &TaskPayload,
        key: &ReservationKey,
    ) -> Result<(), ValidationError> {
        let previous = self
            .ledger
            .get_transaction(&task.previous_transaction)
            .ok_or(CorruptedChainError {
                missing: task.previous_transaction,
            })?;

        let genesis = self.ledger.get_transaction(&task.workflow_transaction);
        let workflow = genesis
            .as_ref()
            .and_then(Transaction::as_workflow)
            .ok_or(ValidationError::UnknownWorkflowTransaction {
                reference: task.workflow_transaction,
            })?;

        if previous.workflow_id() != Some(task.workflow_id.as_str()) || workflow.workflow_id != task.workflow_id {
            return Err(ValidationError::WorkflowIdMismatch {
                own: task.workflow_id.clone(),
                previous: previous.workflow_id().map(str::to_string),
                genesis: Some(workflow.workflow_id.clone()),
            });
        }

        if tx.sender() != previous.receiver() {
            return Err(ValidationError::CustodyBroken);
        }

        let previous_in_charge = previous.in_charge().ok_or(ValidationError::NotInCharge)?;
        if key_component(previous_in_charge) != tx.sender() {
            return Err(ValidationError::NotInCharge);
        }

        if key_component(&task.in_charge) != tx.receiver() {
            return Err(ValidationError::ReceiverMismatch {
                in_charge: task.in_charge.clone(),
            });
        }

        for attribute in task.document.keys() {
            let allowed = workflow
                .permissions
                .get(attribute)
                .is_some_and(|pids| pids.iter().any(|pid| pid == previous_in_charge));
            if !allowed {
                return Err(ValidationError::WritePermissionDenied {
                    attribute: attribute.clone(),
                });
            }
        }

        let permitted_handover = workflow
            .processes
            .get(previous_in_charge)
            .is_some_and(|successors| successors.contains(&task.in_charge));
        if !permitted_handover {
            return Err(ValidationError::ProcessViolation {
                from: previous_in_charge.to_string(),
                to: task.in_charge.clone(),
            });
        }

        if self.has_fork(tx, task) || self.reservations.conflicts(key, tx.hash()) {
            return Err(ValidationError::DuplicateTransaction {
                previous: task.previous_transaction,
            });
        }

        debug!("Task {:?} passed custody and fork checks", tx.hash());
        Ok(())
    }

    /// Whether a committed transaction between the same parties already
    /// continues the same predecessor in the same workflow
    fn has_fork(&self, tx: &Transaction, task: &TaskPayload) -> bool {
        self.ledger
            .find_continuations(tx.sender(), tx.receiver(), &task.previous_transaction)
            .iter()
            .filter(|candidate| {
                matches!(
                    candidate.transaction_type(),
                    TransactionType::Workflow | TransactionType::Task
                )
            })
            .any(|candidate| candidate.workflow_id() == Some(task.workflow_id.as_str()))
    }

    /// Uniqueness and well-formedness rules of a genesis transaction
    fn check_workflow_rules(
        &self,
        tx: &Transaction,
        workflow: &WorkflowPayload,
        key: &ReservationKey,
    ) -> Result<(), ValidationError> {
        let workflow_id = workflow.workflow_id.as_str();

        // A committed genesis blocks even its own resubmission; pending and
        // reserved ones only block other transactions.
        let committed = !self.ledger.find_workflow_transactions(workflow_id).is_empty();
        let pending = self
            .pool
            .get_pending_workflow_transactions()
            .iter()
            .any(|candidate| candidate.workflow_id() == Some(workflow_id) && candidate.hash() != tx.hash());
        if committed || pending || self.reservations.conflicts(key, tx.hash()) {
            return Err(ValidationError::DuplicateWorkflowId {
                workflow_id: workflow.workflow_id.clone(),
            });
        }

        for (owner, successors) in &workflow.processes {
            self.check_pid(owner)?;
            for successor in successors {
                self.check_pid(successor)?;
            }
        }

        for (attribute, pids) in &workflow.permissions {
            for pid in pids {
                self.check_pid(pid)?;
            }
            if !workflow.document.contains_key(attribute) {
                return Err(ValidationError::UnknownPermissionAttribute {
                    attribute: attribute.clone(),
                });
            }
        }

        debug!("Workflow {:?} passed genesis checks", tx.hash());
        Ok(())
    }

    /// Checks shared by every workflow-kind transaction, outside the lock
    fn check_common(&self, tx: &Transaction, in_charge: &str) -> Result<(), ValidationError> {
        self.check_pid(in_charge)?;
        self.check_signature(tx)
    }

    fn check_pid(&self, pid: &str) -> Result<(), ValidationError> {
        Pid::parse(pid, self.provider.as_ref())
            .map(|_| ())
            .map_err(|reason| ValidationError::MalformedPid {
                pid: pid.to_string(),
                reason,
            })
    }

    fn check_signature(&self, tx: &Transaction) -> Result<(), ValidationError> {
        if tx.validate_signature(self.provider.as_ref()) {
            Ok(())
        } else {
            Err(ValidationError::InvalidSignature)
        }
    }
}
