//! SOAP binding tests
//!
//! Runs the delegation-2 client against a wiremock endpoint over plain HTTP.

use chrono::{TimeZone, Utc};
use wiremock::matchers::{body_string_contains, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use proxy_delegation::models::SignedProxyCertificate;
use proxy_delegation::services::{DelegationService, SoapDelegationClient};

use crate::common::{soap, test_id};

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/xml; charset=utf-8")
}

fn client_for(server: &MockServer) -> SoapDelegationClient {
    SoapDelegationClient::new(reqwest::Client::new(), server.uri())
}

#[tokio::test]
async fn test_termination_time_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", "\"\""))
        .and(body_string_contains("getTerminationTime"))
        .and(body_string_contains("<delegationID>1234</delegationID>"))
        .respond_with(xml(soap::termination_time("2026-10-19T12:00:00Z")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let termination = client.query_termination_time(&test_id()).await.unwrap();

    assert_eq!(termination, Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
}

#[tokio::test]
async fn test_fault_is_reported_with_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("getTerminationTime"))
        .respond_with(
            ResponseTemplate::new(500).set_body_raw(
                soap::fault("Delegation error", "Delegation ID 1234 not found"),
                "text/xml",
            ),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fault = client.query_termination_time(&test_id()).await.unwrap_err();

    assert_eq!(fault.code.as_deref(), Some("SOAP-ENV:Server"));
    assert_eq!(fault.message, "Delegation error");
    assert_eq!(fault.detail.as_deref(), Some("Delegation ID 1234 not found"));
}

#[tokio::test]
async fn test_proxy_requests_return_pem_text() {
    let pem = "-----BEGIN CERTIFICATE REQUEST-----\nMIIBAAAA\n-----END CERTIFICATE REQUEST-----\n";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("getProxyReq"))
        .respond_with(xml(soap::proxy_request("getProxyReq", pem)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("renewProxyReq"))
        .respond_with(xml(soap::proxy_request("renewProxyReq", pem)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fresh = client.request_fresh_csr(&test_id()).await.unwrap();
    let renewal = client.request_renewal_csr(&test_id()).await.unwrap();

    assert_eq!(fresh.as_str(), pem);
    assert_eq!(renewal.as_str(), pem);
}

#[tokio::test]
async fn test_missing_return_value_is_empty_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(xml(soap::response("getProxyReq", "")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let csr = client.request_fresh_csr(&test_id()).await.unwrap();

    assert!(csr.is_empty());
}

#[tokio::test]
async fn test_put_proxy_sends_escaped_certificate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("Content-Type", "text/xml; charset=utf-8"))
        .and(body_string_contains("putProxy"))
        .and(body_string_contains("<proxy>CERT&lt;A&gt;</proxy>"))
        .respond_with(xml(soap::put_proxy_ack()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .upload_signed_certificate(&test_id(), &SignedProxyCertificate::new("CERT<A>"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_http_error_without_envelope_is_transport_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fault = client.request_fresh_csr(&test_id()).await.unwrap_err();

    assert_eq!(fault.code.as_deref(), Some("transport"));
    assert!(fault.message.contains("503"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_fault() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = SoapDelegationClient::new(reqwest::Client::new(), uri);
    let fault = client.query_termination_time(&test_id()).await.unwrap_err();

    assert_eq!(fault.code.as_deref(), Some("transport"));
}
