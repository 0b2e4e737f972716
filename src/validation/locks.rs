//! Validation locking
//!
//! Rule checks that scan shared ledger and pool state run inside a critical
//! section taken from a `LockRegistry`. A transaction that passed every
//! check records what it claims in `Reservations` before its final section
//! ends, so a concurrent validation of a conflicting transaction sees the
//! claim even though the first transaction has not reached the pool or the
//! ledger yet.

use crate::TxHash;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;

/// Granularity of the validation critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// One lock shared by every validation
    Global,
    /// One lock per workflow id, created on first use
    #[default]
    PerWorkflow,
}

/// Lazily populated registry of validation locks
///
/// Callers hold the returned handle and lock it in their own scope, so the
/// guard is released on every exit path.
pub struct LockRegistry {
    mode: LockMode,
    global: Arc<Mutex<()>>,
    keyed: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new(mode: LockMode) -> Self {
        Self {
            mode,
            global: Arc::new(Mutex::new(())),
            keyed: DashMap::new(),
        }
    }

    /// The lock guarding validations of `workflow_id`
    pub fn lock_for(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        match self.mode {
            LockMode::Global => Arc::clone(&self.global),
            LockMode::PerWorkflow => {
                if let Some(lock) = self.keyed.get(workflow_id) {
                    return Arc::clone(lock.value());
                }
                let lock = self
                    .keyed
                    .entry(workflow_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())));
                Arc::clone(lock.value())
            }
        }
    }

    /// Number of per-workflow locks created so far
    pub fn len(&self) -> usize {
        self.keyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty()
    }
}

/// What an admitted-but-uncommitted transaction claims
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReservationKey {
    /// A genesis transaction claims its workflow id
    Workflow(String),
    /// A task claims continuing `previous` between `sender` and `receiver`
    Fork {
        workflow_id: String,
        sender: String,
        receiver: String,
        previous: TxHash,
    },
}

/// Claims held by transactions that passed the rule checks
#[derive(Default)]
pub struct Reservations {
    claims: DashMap<ReservationKey, TxHash>,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction other than `hash` holds `key`
    pub fn conflicts(&self, key: &ReservationKey, hash: TxHash) -> bool {
        self.claims.get(key).is_some_and(|holder| *holder != hash)
    }

    /// Claim `key` for `hash`
    ///
    /// # Returns
    /// `true` if the claim is new, `false` if `key` was already held
    pub fn reserve(&self, key: ReservationKey, hash: TxHash) -> bool {
        match self.claims.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(hash);
                true
            }
        }
    }

    /// Drop every claim held by `hash`
    pub fn release(&self, hash: &TxHash) {
        self.claims.retain(|_, holder| *holder != *hash);
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H256;

    #[test]
    fn test_per_workflow_locks_are_shared_per_key() {
        let registry = LockRegistry::new(LockMode::PerWorkflow);

        let a = registry.lock_for("W1");
        let b = registry.lock_for("W1");
        let c = registry.lock_for("W2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_global_mode_uses_one_lock() {
        let registry = LockRegistry::new(LockMode::Global);

        let a = registry.lock_for("W1");
        let b = registry.lock_for("W2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_other_workflow_is_not_blocked() {
        let registry = LockRegistry::new(LockMode::PerWorkflow);
        let held = registry.lock_for("W1");
        let _guard = held.lock();

        assert!(registry.lock_for("W2").try_lock().is_some());
        assert!(registry.lock_for("W1").try_lock().is_none());
    }

    #[test]
    fn test_reservation_lifecycle() {
        let reservations = Reservations::new();
        let key = ReservationKey::Workflow("W1".to_string());
        let first = H256::repeat_byte(1);
        let second = H256::repeat_byte(2);

        assert!(!reservations.conflicts(&key, first));
        assert!(reservations.reserve(key.clone(), first));
        assert!(!reservations.reserve(key.clone(), second));

        assert!(!reservations.conflicts(&key, first));
        assert!(reservations.conflicts(&key, second));

        // Releasing a transaction that holds nothing leaves the claim alone
        reservations.release(&second);
        assert!(reservations.conflicts(&key, second));

        reservations.release(&first);
        assert!(reservations.is_empty());
        assert!(reservations.reserve(key, second));
    }
}
