//! Remote delegation capability
//!
//! The four round trips of the delegation protocol, independent of the
//! RPC binding that carries them. [`crate::services::soap`] provides the
//! GridSite delegation-2 binding; tests substitute in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CertificateSigningRequest, DelegationId, SignedProxyCertificate};

/// Protocol-level fault reported by the endpoint or the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    /// Fault code (`faultcode` for SOAP)
    pub code: Option<String>,
    /// Human-readable fault text
    pub message: String,
    /// Service-specific detail, when provided
    pub detail: Option<String>,
}

impl RemoteFault {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(String::from),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Fault raised by the channel rather than by the service
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Some("transport"), message)
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{}: ", code)?;
        }
        f.write_str(&self.message)?;
        if let Some(detail) = &self.detail {
            if detail != &self.message {
                write!(f, " ({})", detail)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RemoteFault {}

/// Operations offered by a delegation endpoint
#[async_trait]
pub trait DelegationService: Send + Sync {
    /// Expiry of the proxy currently delegated under `id`
    ///
    /// A fault here means "no delegation found" to the orchestrator.
    async fn query_termination_time(&self, id: &DelegationId) -> Result<DateTime<Utc>, RemoteFault>;

    /// Ask for a CSR backing a new delegation
    async fn request_fresh_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault>;

    /// Ask for a CSR extending an existing delegation
    async fn request_renewal_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault>;

    /// Hand the signed proxy back to the endpoint
    async fn upload_signed_certificate(
        &self,
        id: &DelegationId,
        proxy: &SignedProxyCertificate,
    ) -> Result<(), RemoteFault>;
}
