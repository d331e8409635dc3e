//! Connection descriptor handed to the session consumer
//!
//! Once the supervised server has announced its certificate hash, the
//! supervisor packages the endpoint address and the pinned fingerprints into
//! a [`ConnectionDescriptor`]. The JSON shape mirrors the options object a
//! WebTransport client expects (`address`, `serverCertificateHashes`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash algorithm used for a certificate fingerprint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256 digest
    #[serde(rename = "sha-256")]
    Sha256,
}

impl HashAlgorithm {
    /// Name of the algorithm as used on the wire
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha-256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single certificate fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHash {
    /// Digest algorithm
    pub algorithm: HashAlgorithm,
    /// Raw digest bytes
    pub value: Vec<u8>,
}

impl CertificateHash {
    /// Build a SHA-256 fingerprint from raw digest bytes
    pub fn sha256(value: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            value: value.into(),
        }
    }
}

/// Everything a client needs to open a session against the supervised server
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    /// Endpoint URI
    pub address: String,
    /// Ordered list of pinned certificate fingerprints
    pub server_certificate_hashes: Vec<CertificateHash>,
}

impl ConnectionDescriptor {
    /// Descriptor with a single pinned fingerprint
    pub fn new(address: impl Into<String>, hash: CertificateHash) -> Self {
        Self {
            address: address.into(),
            server_certificate_hashes: vec![hash],
        }
    }

    /// The first SHA-256 fingerprint, if any
    #[must_use]
    pub fn sha256(&self) -> Option<&[u8]> {
        self.server_certificate_hashes
            .iter()
            .find(|h| h.algorithm == HashAlgorithm::Sha256)
            .map(|h| h.value.as_slice())
    }
}
