//! Attestation of synchronous verification results.
//!
//! A synchronous verification returns `{attestation, result}`. The default
//! attestor is a blake3 digest of the serialized result, keyed when a key is
//! configured so that only holders of the key can reproduce it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::VerificationReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// `blake3` or `blake3-keyed`.
    pub scheme: String,
    /// Hex digest of the attested payload.
    pub digest: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("attestation key must be 64 hex characters")]
    InvalidKey,
    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait Attestor: Send + Sync {
    async fn attest(&self, payload: &str) -> Result<Attestation, AttestationError>;
}

#[derive(Debug, Clone, Default)]
pub struct DigestAttestor {
    key: Option<[u8; 32]>,
}

impl DigestAttestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyed(key: [u8; 32]) -> Self {
        Self { key: Some(key) }
    }

    /// Parse a 64-character hex key.
    pub fn from_hex_key(hex: &str) -> Result<Self, AttestationError> {
        let key = blake3::Hash::from_hex(hex.trim()).map_err(|_| AttestationError::InvalidKey)?;
        Ok(Self::keyed(*key.as_bytes()))
    }

    /// `TRUTHSEEKER_ATTESTATION_KEY` when set, plain digest otherwise.
    pub fn from_env() -> Result<Self, AttestationError> {
        match std::env::var("TRUTHSEEKER_ATTESTATION_KEY") {
            Ok(key) if !key.trim().is_empty() => Self::from_hex_key(&key),
            _ => Ok(Self::new()),
        }
    }

    pub fn digest(&self, payload: &str) -> (String, &'static str) {
        match &self.key {
            Some(key) => (
                blake3::keyed_hash(key, payload.as_bytes()).to_hex().to_string(),
                "blake3-keyed",
            ),
            None => (
                blake3::hash(payload.as_bytes()).to_hex().to_string(),
                "blake3",
            ),
        }
    }
}

#[async_trait::async_trait]
impl Attestor for DigestAttestor {
    async fn attest(&self, payload: &str) -> Result<Attestation, AttestationError> {
        let (digest, scheme) = self.digest(payload);
        Ok(Attestation {
            scheme: scheme.to_string(),
            digest,
            issued_at: Utc::now(),
        })
    }
}

/// What the synchronous path hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestedReport {
    pub attestation: Attestation,
    pub result: VerificationReport,
}

/// Serialize `report` and attest exactly those bytes.
pub async fn attest_report(
    attestor: &dyn Attestor,
    report: VerificationReport,
) -> Result<AttestedReport, AttestationError> {
    let payload = serde_json::to_string(&report)?;
    let attestation = attestor.attest(&payload).await?;
    Ok(AttestedReport {
        attestation,
        result: report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_digest_is_blake3() {
        let a = DigestAttestor::new().attest("hello").await.unwrap();
        assert_eq!(a.scheme, "blake3");
        assert_eq!(a.digest, blake3::hash(b"hello").to_hex().to_string());
    }

    #[tokio::test]
    async fn keyed_digest_differs_from_plain() {
        let keyed = DigestAttestor::from_hex_key(&"ab".repeat(32)).unwrap();
        let a = keyed.attest("hello").await.unwrap();
        assert_eq!(a.scheme, "blake3-keyed");
        assert_eq!(
            a.digest,
            blake3::keyed_hash(&[0xab; 32], b"hello").to_hex().to_string()
        );
        assert_ne!(a.digest, DigestAttestor::new().digest("hello").0);
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(DigestAttestor::from_hex_key("abcd").is_err());
        assert!(DigestAttestor::from_hex_key(&"zz".repeat(32)).is_err());
        assert!(DigestAttestor::from_hex_key(&"ab".repeat(33)).is_err());
        assert!(DigestAttestor::from_hex_key("").is_err());
    }

    #[test]
    fn hex_key_is_trimmed_and_case_insensitive() {
        let upper = DigestAttestor::from_hex_key(&format!(" {} \n", "AB".repeat(32))).unwrap();
        let lower = DigestAttestor::keyed([0xab; 32]);
        assert_eq!(upper.digest("payload"), lower.digest("payload"));
    }
}
