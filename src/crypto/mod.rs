//! Cryptographic Provider Module
//!
//! Signing, verification, hashing and key handling used by transactions and
//! the validation engine. Everything goes through the `CryptoProvider` trait so
//! the engine never touches curve types directly.

mod provider;

pub use provider::{digest, CryptoError, CryptoProvider, KeyPair, Secp256k1Provider};
