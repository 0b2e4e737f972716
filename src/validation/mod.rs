//! Transaction Validation Module
//!
//! This module decides whether a transaction may be admitted, given the
//! committed ledger and the pending pool. Genesis transactions are checked for
//! workflow-id uniqueness and well-formed process and permission tables; task
//! transactions for custody continuity, write permissions, the process
//! definition and forks of the custody chain.

mod locks;
mod validator;


pub use locks::{LockMode, LockRegistry, ReservationKey, Reservations};
pub use validator::Validator;
