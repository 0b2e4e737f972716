use base64::{engine::general_purpose::STANDARD, Engine};
use ethers::core::k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use ethers::core::rand::thread_rng;
use ethers::types::H256;
use ethers::utils::keccak256;
use thiserror::Error;

/// Errors raised while handling keys and signatures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("private key is not a valid base64 secp256k1 scalar")]
    InvalidPrivateKey,
    #[error("public key is not a valid secp256k1 point")]
    InvalidPublicKey,
    #[error("signature is not a valid base64 ECDSA signature")]
    InvalidSignature,
}

/// A freshly generated key pair in text form
///
/// Both halves are standard base64: the private key encodes the 32-byte
/// scalar, the public key the SEC1-compressed curve point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

/// Cryptographic collaborator consumed by transactions and the validator
///
/// Implementations must be usable from many validation threads at once.
pub trait CryptoProvider: Send + Sync {
    /// Sign `data` with a base64 private key, returning a base64 signature
    fn sign(&self, data: &[u8], private_key: &str) -> Result<String, CryptoError>;

    /// Check a base64 signature over `data` against a base64 public key
    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> bool;

    /// Fixed-length digest of `data`
    fn hash(&self, data: &[u8]) -> H256;

    /// Import raw (already base64-decoded) public key bytes
    ///
    /// Returns the canonical text form of the key on success.
    fn import_public_key(&self, decoded: &[u8]) -> Result<String, CryptoError>;

    /// Generate a new random key pair
    fn generate_key_pair(&self) -> KeyPair;
}

/// Keccak-256 digest shared by transaction and block hashing
pub fn digest(data: &[u8]) -> H256 {
    H256::from(keccak256(data))
}

/// ECDSA over secp256k1; signatures digest the message with SHA-256, `hash` is Keccak-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Provider;

impl Secp256k1Provider {
    pub fn new() -> Self {
        Self
    }

    fn signing_key(private_key: &str) -> Result<SigningKey, CryptoError> {
        let bytes = STANDARD
            .decode(private_key)
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)
    }

    fn verifying_key(public_key: &str) -> Result<VerifyingKey, CryptoError> {
        let bytes = STANDARD
            .decode(public_key)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)
    }

    fn encode_public(key: &VerifyingKey) -> String {
        STANDARD.encode(key.to_encoded_point(true).as_bytes())
    }
}

impl CryptoProvider for Secp256k1Provider {
    fn sign(&self, data: &[u8], private_key: &str) -> Result<String, CryptoError> {
        let key = Self::signing_key(private_key)?;
        let signature: Signature = key.sign(data);
        Ok(STANDARD.encode(signature.to_bytes()))
    }

    fn verify(&self, data: &[u8], signature: &str, public_key: &str) -> bool {
        let Ok(key) = Self::verifying_key(public_key) else {
            return false;
        };
        let Ok(raw) = STANDARD.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&raw) else {
            return false;
        };
        key.verify(data, &signature).is_ok()
    }

    fn hash(&self, data: &[u8]) -> H256 {
        digest(data)
    }

    fn import_public_key(&self, decoded: &[u8]) -> Result<String, CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(decoded).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self::encode_public(&key))
    }

    fn generate_key_pair(&self) -> KeyPair {
        let key = SigningKey::random(&mut thread_rng());
        KeyPair {
            private_key: STANDARD.encode(key.to_bytes()),
            public_key: Self::encode_public(key.verifying_key()),
        }
    }
}
