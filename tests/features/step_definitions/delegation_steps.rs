//! Delegation step definitions

use std::time::Duration;

use cucumber::{given, then, when};
use x509_parser::pem::parse_x509_pem;

use proxy_delegation::models::CertificateSigningRequest;
use proxy_delegation::services::{DelegationOrchestrator, TracingObserver, X509ProxySigner};
use proxy_delegation::LibraryError;

use crate::common::{
    endpoint_csr, test_id, CredentialFixture, MockDelegationService, MockOperation,
};
use crate::features::support::TestWorld;

fn operation(name: &str) -> MockOperation {
    match name {
        "getTerminationTime" => MockOperation::GetTerminationTime,
        "getProxyReq" => MockOperation::GetProxyReq,
        "renewProxyReq" => MockOperation::RenewProxyReq,
        "putProxy" => MockOperation::PutProxy,
        other => panic!("unknown operation {:?}", other),
    }
}

#[given("the endpoint has no delegated proxy")]
async fn endpoint_without_proxy(world: &mut TestWorld) {
    world.remaining = None;
}

#[given(expr = "the endpoint holds a proxy expiring in {int} seconds")]
async fn endpoint_with_proxy(world: &mut TestWorld, remaining: i64) {
    world.remaining = Some(remaining);
}

#[given("the endpoint returns an empty signing request")]
async fn endpoint_returns_empty_csr(world: &mut TestWorld) {
    world.empty_csr = true;
}

#[given(expr = "the endpoint rejects {string}")]
async fn endpoint_rejects(world: &mut TestWorld, op: String) {
    world.failing.push(op);
}

#[when(expr = "I delegate with a lifetime of {int} seconds")]
async fn delegate_with_lifetime(world: &mut TestWorld, lifetime: u64) {
    world.lifetime = lifetime;

    let user = CredentialFixture::new("Jane Doe");
    let credential = user.loaded();
    let csr = if world.empty_csr {
        CertificateSigningRequest::new("")
    } else {
        endpoint_csr().0
    };

    let mut service = MockDelegationService::new(&csr);
    if let Some(remaining) = world.remaining {
        service = service.with_remaining(remaining);
    }
    for op in &world.failing {
        service = service.failing(operation(op));
    }

    let signer = X509ProxySigner::new(&credential);
    let result = DelegationOrchestrator::new(&service, &signer, &TracingObserver)
        .execute(test_id(), Duration::from_secs(lifetime))
        .await;

    world.calls = service.calls().into_iter().map(String::from).collect();
    world.uploaded_lifetime = service.uploaded().map(|proxy| {
        let (_, pem) = parse_x509_pem(proxy.as_str().as_bytes()).unwrap();
        let cert = pem.parse_x509().unwrap();
        let validity = cert.validity();
        validity.not_after.timestamp() - validity.not_before.timestamp()
    });
    world.outcome = Some(
        result
            .map(|id| id.into_string())
            .map_err(|failure| LibraryError::from(failure).message),
    );
}

#[then(expr = "the delegation identifier should be {string}")]
async fn identifier_should_be(world: &mut TestWorld, expected: String) {
    let id = tokio_test::assert_ok!(world.outcome.clone().unwrap());
    assert_eq!(id, expected);
}

#[then(expr = "the endpoint should have received {string}")]
async fn endpoint_received(world: &mut TestWorld, ops: String) {
    let expected: Vec<String> = ops.split(", ").map(String::from).collect();
    assert_eq!(world.calls, expected);
}

#[then(expr = "the endpoint should not have received {string}")]
async fn endpoint_not_received(world: &mut TestWorld, op: String) {
    assert!(!world.calls.contains(&op));
}

#[then("the uploaded proxy should be valid for the requested lifetime")]
async fn uploaded_proxy_lifetime(world: &mut TestWorld) {
    assert_eq!(world.uploaded_lifetime, Some(world.lifetime as i64));
}

#[then(expr = "the attempt should fail with {string}")]
async fn attempt_should_fail(world: &mut TestWorld, message: String) {
    tokio_test::assert_err!(world.outcome.clone().unwrap());
    assert!(
        world.error_message().starts_with(&message),
        "{:?} does not start with {:?}",
        world.error_message(),
        message
    );
}
