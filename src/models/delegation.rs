//! Delegation request and protocol artifact models

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier used when no other one is configured
pub const DEFAULT_DELEGATION_ID: &str = "1234";

/// Opaque handle naming a delegation slot at the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationId(String);

impl DelegationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the identifier of an attempt is chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "policy", content = "value")]
pub enum DelegationIdPolicy {
    /// Same identifier for every attempt
    Fixed(String),
    /// Fresh UUID v4 per attempt
    Random,
}

impl Default for DelegationIdPolicy {
    fn default() -> Self {
        DelegationIdPolicy::Fixed(DEFAULT_DELEGATION_ID.to_string())
    }
}

impl DelegationIdPolicy {
    /// Pick the identifier for one attempt
    pub fn resolve(&self) -> DelegationId {
        match self {
            DelegationIdPolicy::Fixed(id) => DelegationId::new(id.clone()),
            DelegationIdPolicy::Random => DelegationId::new(Uuid::new_v4().to_string()),
        }
    }
}

/// Location of the user's long-lived credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    /// PEM file holding the certificate chain (and possibly the key)
    pub cert_path: PathBuf,
    /// PEM file holding the private key, if separate
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl UserCredential {
    pub fn new(cert_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: None,
        }
    }

    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Key file to use; the certificate file doubles as key file when unset
    pub fn effective_key_path(&self) -> &Path {
        self.key_path.as_deref().unwrap_or(&self.cert_path)
    }
}

/// Transport settings passed through to the RPC channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Overall per-call timeout; `None` leaves it to the transport
    pub timeout: Option<Duration>,
    /// Verify the endpoint's certificate chain
    pub verify_peer: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            verify_peer: true,
        }
    }
}

/// Caller input for one delegation attempt
#[derive(Clone)]
pub struct DelegationRequest {
    pub endpoint: String,
    pub credential: UserCredential,
    pub passphrase: Option<String>,
    pub ca_path: PathBuf,
    pub lifetime: Duration,
    pub transport: TransportOptions,
}

impl DelegationRequest {
    pub fn new(
        endpoint: impl Into<String>,
        credential: UserCredential,
        ca_path: impl Into<PathBuf>,
        lifetime: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential,
            passphrase: None,
            ca_path: ca_path.into(),
            lifetime,
            transport: TransportOptions::default(),
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }
}

impl fmt::Debug for DelegationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationRequest")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("ca_path", &self.ca_path)
            .field("lifetime", &self.lifetime)
            .field("transport", &self.transport)
            .finish()
    }
}

/// What the endpoint reports about an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteDelegationState {
    /// Expiry of the currently delegated proxy, if any
    pub termination: Option<DateTime<Utc>>,
}

impl RemoteDelegationState {
    pub fn none() -> Self {
        Self { termination: None }
    }

    pub fn expiring_at(termination: DateTime<Utc>) -> Self {
        Self {
            termination: Some(termination),
        }
    }

    /// Seconds left at `now`; negative once expired, `None` without delegation
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.termination.map(|t| (t - now).num_seconds())
    }
}

/// PEM certificate signing request produced by the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSigningRequest(String);

impl CertificateSigningRequest {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// PEM proxy certificate (plus issuer chain) produced locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProxyCertificate(String);

impl SignedProxyCertificate {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
