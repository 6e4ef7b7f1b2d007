//! Delegation services

pub mod credential;
pub mod delegation_service;
pub mod orchestrator;
pub mod policy;
pub mod session;
pub mod signer;
pub mod soap;

pub use credential::{load_trust_anchors, LoadedCredential};
pub use delegation_service::{DelegationService, RemoteFault};
pub use orchestrator::{
    DelegationEvent, DelegationObserver, DelegationOrchestrator, DelegationState, TracingObserver,
};
pub use policy::{decide, DelegationDecision};
pub use session::SecureSession;
pub use signer::{ProxySigner, X509ProxySigner};
pub use soap::{SoapDelegationClient, DELEGATION_NAMESPACE};
