use crate::crypto::CryptoProvider;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use thiserror::Error;
use tracing::debug;

const SEPARATOR: char = '_';

/// Reasons a PID string fails to parse
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPidError {
    #[error("wrong-shape")]
    WrongShape,
    #[error("bad-sequence")]
    BadSequence,
    #[error("bad-key")]
    BadKey,
}

/// A parsed process identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    public_key: String,
    sequence: u64,
}

impl Pid {
    pub fn new(public_key: impl Into<String>, sequence: u64) -> Self {
        Self {
            public_key: public_key.into(),
            sequence,
        }
    }

    /// Parse and check a PID string
    ///
    /// # Errors
    /// * `WrongShape` unless splitting on `_` yields exactly two segments
    /// * `BadSequence` if the second segment is not a non-negative integer
    /// * `BadKey` if the first segment is not base64 or the provider rejects
    ///   the decoded bytes as a public key
    pub fn parse(pid: &str, provider: &dyn CryptoProvider) -> Result<Self, MalformedPidError> {
        let parts: Vec<&str> = pid.split(SEPARATOR).collect();
        let [key, sequence] = parts.as_slice() else {
            return Err(MalformedPidError::WrongShape);
        };

        let sequence: u64 = sequence.parse().map_err(|_| {
            debug!("Sequence number in PID is {:?}", sequence);
            MalformedPidError::BadSequence
        })?;

        let decoded = STANDARD.decode(key).map_err(|_| {
            debug!("Public key in PID is not base64: {:?}", key);
            MalformedPidError::BadKey
        })?;
        provider.import_public_key(&decoded).map_err(|_| {
            debug!("Public key in PID is not a key: {:?}", key);
            MalformedPidError::BadKey
        })?;

        Ok(Self::new(*key, sequence))
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.public_key, SEPARATOR, self.sequence)
    }
}

/// Parse a PID string into its key and sequence
pub fn parse_pid(pid: &str, provider: &dyn CryptoProvider) -> Result<Pid, MalformedPidError> {
    Pid::parse(pid, provider)
}

/// Render a key and sequence as a PID string
pub fn format_pid(public_key: &str, sequence: u64) -> String {
    Pid::new(public_key, sequence).to_string()
}

/// The public-key segment of a PID, without checking the rest of it
///
/// Custody checks compare this segment against transaction keys; full
/// well-formedness is checked separately.
pub fn key_component(pid: &str) -> &str {
    pid.split(SEPARATOR).next().unwrap_or(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secp256k1Provider;

    #[test]
    fn test_round_trip() {
        let provider = Secp256k1Provider::new();
        let keys = provider.generate_key_pair();

        for sequence in [0, 1, 42, u64::MAX] {
            let text = format_pid(&keys.public_key, sequence);
            let pid = parse_pid(&text, &provider).unwrap();
            assert_eq!(pid.public_key(), keys.public_key);
            assert_eq!(pid.sequence(), sequence);
            assert_eq!(pid.to_string(), text);
        }
    }

    #[test]
    fn test_wrong_shape() {
        let provider = Secp256k1Provider::new();
        let keys = provider.generate_key_pair();

        assert_eq!(
            parse_pid(&keys.public_key, &provider),
            Err(MalformedPidError::WrongShape)
        );
        assert_eq!(
            parse_pid(&format!("{}_1_2", keys.public_key), &provider),
            Err(MalformedPidError::WrongShape)
        );
    }

    #[test]
    fn test_bad_sequence() {
        let provider = Secp256k1Provider::new();
        let keys = provider.generate_key_pair();

        for sequence in ["", "x", "-1", "1.5"] {
            assert_eq!(
                parse_pid(&format!("{}_{}", keys.public_key, sequence), &provider),
                Err(MalformedPidError::BadSequence)
            );
        }
    }

    #[test]
    fn test_bad_key() {
        let provider = Secp256k1Provider::new();

        // Not base64 at all
        assert_eq!(parse_pid("%%%_1", &provider), Err(MalformedPidError::BadKey));
        // Valid base64, but not a curve point
        let junk = STANDARD.encode(b"hello world");
        assert_eq!(
            parse_pid(&format!("{junk}_1"), &provider),
            Err(MalformedPidError::BadKey)
        );
    }

    #[test]
    fn test_sequence_checked_before_key() {
        let provider = Secp256k1Provider::new();

        assert_eq!(parse_pid("%%%_x", &provider), Err(MalformedPidError::BadSequence));
    }

    #[test]
    fn test_key_component() {
        assert_eq!(key_component("abc_3"), "abc");
        assert_eq!(key_component("abc"), "abc");
        assert_eq!(key_component("a_b_c"), "a");
    }
}
