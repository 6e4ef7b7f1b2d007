//! Error types and handling
//!
//! Every failure of a delegation attempt ends up as a [`LibraryError`]: the
//! structured `{scope, status code, message}` error shared with the rest of
//! the storage library. Inside the crate, failures are raised as
//! [`DelegationFailure`] and translated once, at the edge of the attempt.

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::services::delegation_service::RemoteFault;

/// Subsystem that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorScope {
    /// Credential delegation
    Delegation,
}

impl ErrorScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorScope::Delegation => "Delegation",
        }
    }
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Any failure of a delegation attempt
    DelegationError,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::DelegationError => f.write_str("DelegationError"),
        }
    }
}

/// Structured library error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{scope}] {code}: {message}")]
pub struct LibraryError {
    pub scope: ErrorScope,
    pub code: StatusCode,
    pub message: String,
}

impl LibraryError {
    /// Build an error from its three parts
    pub fn setup(scope: ErrorScope, code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            scope,
            code,
            message: message.into(),
        }
    }

    /// Shorthand for the delegation scope and status family
    pub fn delegation(message: impl Into<String>) -> Self {
        Self::setup(ErrorScope::Delegation, StatusCode::DelegationError, message)
    }
}

/// Terminal failures of a delegation attempt
#[derive(Debug, Error)]
pub enum DelegationFailure {
    /// The identifier chosen for the attempt cannot name a delegation slot
    #[error("Invalid delegation identifier: {0:?}")]
    InvalidId(String),

    /// The mutual-TLS session could not be built
    #[error("Could not connect to the delegation endpoint: {0}")]
    Session(String),

    /// A remote call returned a protocol-level fault
    #[error("{context} failed: {fault}")]
    Remote {
        context: &'static str,
        fault: RemoteFault,
    },

    /// The endpoint handed back no signing request
    #[error("Could not get a request")]
    MissingRequest,

    /// The proxy could not be signed locally
    #[error("Proxy signing failed: {0}")]
    Signing(#[from] SigningError),

    /// The signed proxy could not be uploaded
    #[error("Upload of the signed proxy failed: {0}")]
    Upload(RemoteFault),
}

impl DelegationFailure {
    /// Wrap a fault raised by one of the CSR request calls
    pub fn remote(context: &'static str, fault: RemoteFault) -> Self {
        DelegationFailure::Remote { context, fault }
    }
}

/// Failures reported by the local signing facility
#[derive(Debug, Error)]
pub enum SigningError {
    /// Signing was requested without a CSR
    #[error("empty certificate signing request")]
    EmptyRequest,

    /// The CSR text could not be parsed
    #[error("invalid certificate signing request: {0}")]
    InvalidRequest(String),

    /// The user credential cannot act as issuer
    #[error("invalid issuer credential: {0}")]
    InvalidIssuer(String),

    /// The certificate could not be produced
    #[error("certificate generation failed: {0}")]
    Generation(String),
}

impl From<x509_cert::der::Error> for SigningError {
    fn from(err: x509_cert::der::Error) -> Self {
        SigningError::Generation(err.to_string())
    }
}

/// Failures while loading local credential material
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    MissingCertificate(String),

    #[error("no private key found in {0}")]
    MissingKey(String),

    #[error("private key in {0} is encrypted and no passphrase was given")]
    PassphraseRequired(String),

    #[error("cannot decrypt private key in {path}: {reason}")]
    Decrypt { path: String, reason: String },

    #[error("unsupported private key in {path}: {reason}")]
    UnsupportedKey { path: String, reason: String },

    #[error("no trusted CA certificate found in {0}")]
    EmptyTrustStore(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl From<CredentialError> for DelegationFailure {
    fn from(err: CredentialError) -> Self {
        DelegationFailure::Session(err.to_string())
    }
}

/// Fault translation into the caller-facing error
impl From<DelegationFailure> for LibraryError {
    fn from(failure: DelegationFailure) -> Self {
        warn!(error = %failure, "Delegation attempt failed");
        LibraryError::delegation(failure.to_string())
    }
}

/// Result type alias for delegation steps
pub type DelegationResult<T> = Result<T, DelegationFailure>;
