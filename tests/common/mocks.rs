//! Mock services for testing
//!
//! Provides an in-memory delegation endpoint and a recording observer for
//! isolated testing without a real endpoint.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use proxy_delegation::models::{
    CertificateSigningRequest, DelegationId, SignedProxyCertificate,
};
use proxy_delegation::services::{
    DelegationEvent, DelegationObserver, DelegationService, DelegationState, RemoteFault,
};

/// Operations the mock endpoint can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOperation {
    GetTerminationTime,
    GetProxyReq,
    RenewProxyReq,
    PutProxy,
}

impl MockOperation {
    pub fn name(&self) -> &'static str {
        match self {
            MockOperation::GetTerminationTime => "getTerminationTime",
            MockOperation::GetProxyReq => "getProxyReq",
            MockOperation::RenewProxyReq => "renewProxyReq",
            MockOperation::PutProxy => "putProxy",
        }
    }
}

/// In-memory delegation endpoint
///
/// Holds at most one delegated proxy per identifier, like a real endpoint,
/// and records every call it receives.
#[derive(Clone, Default)]
pub struct MockDelegationService {
    termination: Arc<RwLock<Option<DateTime<Utc>>>>,
    csr: Arc<RwLock<String>>,
    failures: Arc<RwLock<Vec<MockOperation>>>,
    calls: Arc<RwLock<Vec<(&'static str, String)>>>,
    uploaded: Arc<RwLock<Option<SignedProxyCertificate>>>,
}

impl MockDelegationService {
    /// Endpoint with no delegation that hands out `csr`
    pub fn new(csr: &CertificateSigningRequest) -> Self {
        let service = Self::default();
        *service.csr.write().unwrap() = csr.as_str().to_string();
        service
    }

    /// Pretend a proxy is delegated that expires in `secs` seconds
    pub fn with_remaining(self, secs: i64) -> Self {
        *self.termination.write().unwrap() = Some(Utc::now() + ChronoDuration::seconds(secs));
        self
    }

    /// Make `operation` return a fault
    pub fn failing(self, operation: MockOperation) -> Self {
        self.failures.write().unwrap().push(operation);
        self
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.read().unwrap().iter().map(|(op, _)| *op).collect()
    }

    /// Identifiers the calls were made with
    pub fn call_ids(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn uploaded(&self) -> Option<SignedProxyCertificate> {
        self.uploaded.read().unwrap().clone()
    }

    fn enter(&self, operation: MockOperation, id: &DelegationId) -> Result<(), RemoteFault> {
        self.calls
            .write()
            .unwrap()
            .push((operation.name(), id.as_str().to_string()));
        if self.failures.read().unwrap().contains(&operation) {
            return Err(RemoteFault::new(
                Some("SOAP-ENV:Server"),
                format!("{} rejected by mock endpoint", operation.name()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DelegationService for MockDelegationService {
    async fn query_termination_time(&self, id: &DelegationId) -> Result<DateTime<Utc>, RemoteFault> {
        self.enter(MockOperation::GetTerminationTime, id)?;
        self.termination.read().unwrap().ok_or_else(|| {
            RemoteFault::new(
                Some("SOAP-ENV:Server"),
                format!("Delegation ID {} not found", id),
            )
        })
    }

    async fn request_fresh_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault> {
        self.enter(MockOperation::GetProxyReq, id)?;
        Ok(CertificateSigningRequest::new(self.csr.read().unwrap().clone()))
    }

    async fn request_renewal_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault> {
        self.enter(MockOperation::RenewProxyReq, id)?;
        Ok(CertificateSigningRequest::new(self.csr.read().unwrap().clone()))
    }

    async fn upload_signed_certificate(
        &self,
        id: &DelegationId,
        proxy: &SignedProxyCertificate,
    ) -> Result<(), RemoteFault> {
        self.enter(MockOperation::PutProxy, id)?;
        *self.uploaded.write().unwrap() = Some(proxy.clone());
        Ok(())
    }
}

/// Observer keeping every event it sees, rendered as short strings
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<RwLock<Vec<String>>>,
    states: Arc<RwLock<Vec<DelegationState>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.read().unwrap().clone()
    }

    /// Target states of all transitions, in order
    pub fn states(&self) -> Vec<DelegationState> {
        self.states.read().unwrap().clone()
    }
}

impl DelegationObserver for RecordingObserver {
    fn on_event(&self, id: &DelegationId, event: &DelegationEvent<'_>) {
        let rendered = match event {
            DelegationEvent::Transition { to, .. } => {
                self.states.write().unwrap().push(*to);
                format!("{} -> {}", id, to)
            }
            DelegationEvent::NoExistingDelegation { .. } => format!("{} no delegation", id),
            DelegationEvent::Decision { decision, .. } => format!("{} decided {}", id, decision),
            DelegationEvent::RemoteCall { operation } => format!("{} call {}", id, operation),
            DelegationEvent::Failure { failure } => format!("{} failed: {}", id, failure),
        };
        self.events.write().unwrap().push(rendered);
    }
}
