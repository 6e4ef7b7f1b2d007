//! Delegation orchestration
//!
//! Drives one attempt through
//! `Init → SessionEstablished → Queried → {NoDelegation | Insufficient | Sufficient}
//! → CsrObtained → Signed → Uploaded`, or into `Failed`.
//!
//! Progress is reported to an injected [`DelegationObserver`] instead of
//! ambient logging state; [`TracingObserver`] forwards it to `tracing`.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::{
    CertificateSigningRequest, DelegationId, RemoteDelegationState, SignedProxyCertificate,
};
use crate::services::delegation_service::{DelegationService, RemoteFault};
use crate::services::policy::{decide, DelegationDecision};
use crate::services::signer::ProxySigner;
use crate::utils::error::{DelegationFailure, DelegationResult};

/// States of a delegation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationState {
    Init,
    SessionEstablished,
    Queried,
    NoDelegation,
    Insufficient,
    Sufficient,
    CsrObtained,
    Signed,
    Uploaded,
    Failed,
}

impl fmt::Display for DelegationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Something worth reporting during an attempt
#[derive(Debug)]
pub enum DelegationEvent<'a> {
    /// State machine moved on
    Transition {
        from: DelegationState,
        to: DelegationState,
    },
    /// Termination-time query failed; treated as "nothing delegated"
    NoExistingDelegation { fault: &'a RemoteFault },
    /// Renewal policy outcome
    Decision {
        decision: DelegationDecision,
        remaining: Option<i64>,
        requested: i64,
    },
    /// A remote operation is about to be issued
    RemoteCall { operation: &'static str },
    /// The attempt ended in `Failed`
    Failure { failure: &'a DelegationFailure },
}

/// Receives progress of delegation attempts, in protocol order
pub trait DelegationObserver: Send + Sync {
    fn on_event(&self, id: &DelegationId, event: &DelegationEvent<'_>);
}

/// Forwards delegation progress to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DelegationObserver for TracingObserver {
    fn on_event(&self, id: &DelegationId, event: &DelegationEvent<'_>) {
        match event {
            DelegationEvent::Transition { from, to } => {
                debug!(delegation_id = %id, %from, %to, "Delegation state change");
            }
            DelegationEvent::NoExistingDelegation { fault } => {
                debug!(delegation_id = %id, %fault, "Could not retrieve delegated credentials");
                info!(delegation_id = %id, "No delegated credentials on the endpoint");
            }
            DelegationEvent::Decision {
                decision: DelegationDecision::Renewal,
                remaining,
                requested,
            } => {
                info!(
                    delegation_id = %id,
                    remaining = ?remaining,
                    requested,
                    "Need to renew the delegated credentials"
                );
            }
            DelegationEvent::Decision {
                decision: DelegationDecision::NoAction,
                remaining,
                ..
            } => {
                info!(
                    delegation_id = %id,
                    remaining = ?remaining,
                    "Remaining life of the delegated credentials is sufficient"
                );
            }
            DelegationEvent::Decision { decision, .. } => {
                debug!(delegation_id = %id, %decision, "Delegation decision");
            }
            DelegationEvent::RemoteCall { operation } => {
                debug!(delegation_id = %id, operation, "Calling delegation endpoint");
            }
            DelegationEvent::Failure { failure } => {
                warn!(delegation_id = %id, error = %failure, "Delegation failed");
            }
        }
    }
}

/// Runs the delegation protocol over an established channel
pub struct DelegationOrchestrator<'a> {
    service: &'a dyn DelegationService,
    signer: &'a dyn ProxySigner,
    observer: &'a dyn DelegationObserver,
}

impl<'a> DelegationOrchestrator<'a> {
    pub fn new(
        service: &'a dyn DelegationService,
        signer: &'a dyn ProxySigner,
        observer: &'a dyn DelegationObserver,
    ) -> Self {
        Self {
            service,
            signer,
            observer,
        }
    }

    /// Run the attempt from `SessionEstablished` to `Uploaded` or `Failed`
    ///
    /// Returns `id` unchanged on success.
    pub async fn execute(
        &self,
        id: DelegationId,
        lifetime: Duration,
    ) -> DelegationResult<DelegationId> {
        match self.run(&id, lifetime).await {
            Ok(()) => Ok(id),
            Err((last, failure)) => {
                self.transition(&id, last, DelegationState::Failed);
                self.observer
                    .on_event(&id, &DelegationEvent::Failure { failure: &failure });
                Err(failure)
            }
        }
    }

    /// Report that the channel for `id` is up
    pub fn report_session_established(&self, id: &DelegationId) {
        self.transition(id, DelegationState::Init, DelegationState::SessionEstablished);
    }

    async fn run(
        &self,
        id: &DelegationId,
        lifetime: Duration,
    ) -> Result<(), (DelegationState, DelegationFailure)> {
        let requested = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);

        let state = self.query(id).await;
        self.transition(id, DelegationState::SessionEstablished, DelegationState::Queried);

        let remaining = state.remaining_at(Utc::now());
        let decision = decide(remaining, requested);
        self.observer.on_event(
            id,
            &DelegationEvent::Decision {
                decision,
                remaining,
                requested,
            },
        );

        let (csr, from) = match decision {
            DelegationDecision::NoAction => {
                self.transition(id, DelegationState::Queried, DelegationState::Sufficient);
                return Ok(());
            }
            DelegationDecision::NewDelegation => {
                let from = DelegationState::NoDelegation;
                self.transition(id, DelegationState::Queried, from);
                self.call(id, "getProxyReq");
                let csr = self
                    .service
                    .request_fresh_csr(id)
                    .await
                    .map_err(|fault| (from, DelegationFailure::remote("Proxy request", fault)))?;
                (csr, from)
            }
            DelegationDecision::Renewal => {
                let from = DelegationState::Insufficient;
                self.transition(id, DelegationState::Queried, from);
                self.call(id, "renewProxyReq");
                // No fallback to a fresh request once renewal was attempted
                let csr = self
                    .service
                    .request_renewal_csr(id)
                    .await
                    .map_err(|fault| (from, DelegationFailure::remote("Renewal", fault)))?;
                (csr, from)
            }
        };

        if csr.is_empty() {
            return Err((from, DelegationFailure::MissingRequest));
        }
        self.transition(id, from, DelegationState::CsrObtained);

        let proxy = self.sign(&csr, lifetime)?;
        self.transition(id, DelegationState::CsrObtained, DelegationState::Signed);

        self.call(id, "putProxy");
        self.service
            .upload_signed_certificate(id, &proxy)
            .await
            .map_err(|fault| (DelegationState::Signed, DelegationFailure::Upload(fault)))?;
        self.transition(id, DelegationState::Signed, DelegationState::Uploaded);

        Ok(())
    }

    /// Query the endpoint; any fault means "nothing delegated"
    async fn query(&self, id: &DelegationId) -> RemoteDelegationState {
        self.call(id, "getTerminationTime");
        match self.service.query_termination_time(id).await {
            Ok(termination) => RemoteDelegationState::expiring_at(termination),
            Err(fault) => {
                self.observer
                    .on_event(id, &DelegationEvent::NoExistingDelegation { fault: &fault });
                RemoteDelegationState::none()
            }
        }
    }

    fn sign(
        &self,
        csr: &CertificateSigningRequest,
        lifetime: Duration,
    ) -> Result<SignedProxyCertificate, (DelegationState, DelegationFailure)> {
        self.signer
            .sign(csr, lifetime)
            .map_err(|e| (DelegationState::CsrObtained, DelegationFailure::Signing(e)))
    }

    fn call(&self, id: &DelegationId, operation: &'static str) {
        self.observer
            .on_event(id, &DelegationEvent::RemoteCall { operation });
    }

    fn transition(&self, id: &DelegationId, from: DelegationState, to: DelegationState) {
        self.observer
            .on_event(id, &DelegationEvent::Transition { from, to });
    }
}
