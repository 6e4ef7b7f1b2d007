//! Proxy Delegation Library
//!
//! Client-side X.509 proxy delegation: opens a mutual-TLS session to a
//! delegation endpoint, asks whether a delegated proxy already exists and how
//! long it lives, and when needed signs the endpoint's certificate request
//! locally and uploads the resulting proxy.
//!
//! ```no_run
//! # async fn run() -> Result<(), proxy_delegation::LibraryError> {
//! use std::time::Duration;
//! use proxy_delegation::{delegate, DelegationContext, DelegationRequest, UserCredential};
//!
//! let request = DelegationRequest::new(
//!     "https://fts3.example.org:8446",
//!     UserCredential::new("/tmp/x509up_u1000"),
//!     "/etc/grid-security/certificates",
//!     Duration::from_secs(12 * 3600),
//! );
//! let id = delegate(&DelegationContext::default(), &request).await?;
//! println!("delegated as {}", id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::DelegationConfig;
pub use models::{DelegationId, DelegationIdPolicy, DelegationRequest, UserCredential};
pub use services::{DelegationObserver, TracingObserver};
pub use utils::error::{ErrorScope, LibraryError, StatusCode};

use services::{
    DelegationEvent, DelegationOrchestrator, DelegationState, SecureSession,
    SoapDelegationClient, X509ProxySigner,
};
use utils::error::DelegationFailure;
use utils::validation::validate_delegation_id;

/// Caller-side settings shared by delegation attempts
#[derive(Clone)]
pub struct DelegationContext {
    /// How each attempt picks its delegation identifier
    pub id_policy: DelegationIdPolicy,
    /// Receives protocol progress
    pub observer: Arc<dyn DelegationObserver>,
}

impl Default for DelegationContext {
    fn default() -> Self {
        Self {
            id_policy: DelegationIdPolicy::default(),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl DelegationContext {
    pub fn new(id_policy: DelegationIdPolicy, observer: Arc<dyn DelegationObserver>) -> Self {
        Self {
            id_policy,
            observer,
        }
    }

    /// Context for the delegation settings of `config`
    pub fn from_config(config: &DelegationConfig) -> Self {
        Self {
            id_policy: config.delegation.id_policy(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for DelegationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationContext")
            .field("id_policy", &self.id_policy)
            .finish_non_exhaustive()
    }
}

/// Delegate a proxy of the request's credential to its endpoint
///
/// Returns the delegation identifier when the endpoint holds a proxy covering
/// the requested lifetime afterwards. Every failure is reported as a
/// [`LibraryError`] in the delegation scope and no identifier is returned.
/// The session is dropped before this returns, on every path.
pub async fn delegate(
    ctx: &DelegationContext,
    request: &DelegationRequest,
) -> Result<DelegationId, LibraryError> {
    let id = ctx.id_policy.resolve();
    if !validate_delegation_id(id.as_str()) {
        let failure = DelegationFailure::InvalidId(id.as_str().to_string());
        return Err(fail_before_session(ctx, &id, failure));
    }

    let session = match SecureSession::establish(request) {
        Ok(session) => session,
        Err(err) => return Err(fail_before_session(ctx, &id, err.into())),
    };

    let service = SoapDelegationClient::from_session(&session);
    let signer = X509ProxySigner::new(session.credential());
    let orchestrator = DelegationOrchestrator::new(&service, &signer, ctx.observer.as_ref());

    orchestrator.report_session_established(&id);
    orchestrator
        .execute(id, request.lifetime)
        .await
        .map_err(LibraryError::from)
}

/// Report an attempt that ends before any remote call
fn fail_before_session(
    ctx: &DelegationContext,
    id: &DelegationId,
    failure: DelegationFailure,
) -> LibraryError {
    ctx.observer.on_event(
        id,
        &DelegationEvent::Transition {
            from: DelegationState::Init,
            to: DelegationState::Failed,
        },
    );
    ctx.observer
        .on_event(id, &DelegationEvent::Failure { failure: &failure });
    failure.into()
}
