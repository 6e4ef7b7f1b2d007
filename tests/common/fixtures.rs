//! Test fixtures for common test data
//!
//! Fixtures mint fresh X.509 material with `rcgen` and write it to a
//! temporary directory laid out like a grid user's environment.

use std::path::PathBuf;
use std::time::Duration;

use rcgen::{CertificateParams, DnType, KeyPair};
use tempfile::TempDir;

use proxy_delegation::models::{CertificateSigningRequest, DelegationRequest, UserCredential};
use proxy_delegation::services::LoadedCredential;
use proxy_delegation::DelegationId;

/// Identifier used by the fixed-id scenarios
pub const TEST_DELEGATION_ID: &str = "1234";

pub fn test_id() -> DelegationId {
    DelegationId::new(TEST_DELEGATION_ID)
}

/// A self-signed user credential on disk
///
/// The certificate doubles as the only trusted CA, so a session built from
/// these files trusts itself.
pub struct CredentialFixture {
    pub dir: TempDir,
    pub cert_pem: String,
    pub key_pem: String,
}

impl CredentialFixture {
    /// Generate a new user credential with subject `O=Grid, CN=<common_name>`
    pub fn new(common_name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::OrganizationName, "Grid");
        params.distinguished_name.push(DnType::CommonName, common_name);
        let cert = params.self_signed(&key).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let fixture = Self {
            dir,
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        };

        std::fs::write(fixture.cert_path(), &fixture.cert_pem).unwrap();
        std::fs::write(fixture.key_path(), &fixture.key_pem).unwrap();
        std::fs::create_dir_all(fixture.ca_dir()).unwrap();
        std::fs::write(fixture.ca_dir().join("usercert.0"), &fixture.cert_pem).unwrap();
        fixture
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("usercert.pem")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("userkey.pem")
    }

    pub fn ca_dir(&self) -> PathBuf {
        self.dir.path().join("certificates")
    }

    pub fn user_credential(&self) -> UserCredential {
        UserCredential::new(self.cert_path()).with_key(self.key_path())
    }

    /// In-memory credential, as a signer would see it
    pub fn loaded(&self) -> LoadedCredential {
        LoadedCredential::from_pem(&self.cert_pem, &self.key_pem, None, "fixture").unwrap()
    }

    /// Request against `endpoint` with this credential
    pub fn request(&self, endpoint: &str, lifetime: Duration) -> DelegationRequest {
        DelegationRequest::new(endpoint, self.user_credential(), self.ca_dir(), lifetime)
    }
}

/// A certificate signing request as an endpoint would produce it
pub fn endpoint_csr() -> (CertificateSigningRequest, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, "proxy");
    let csr = params.serialize_request(&key).unwrap();
    (CertificateSigningRequest::new(csr.pem().unwrap()), key)
}

/// SOAP response envelopes, as a GridSite endpoint writes them
pub mod soap {
    use proxy_delegation::services::DELEGATION_NAMESPACE;

    pub fn response(operation: &str, inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="{ns}"><SOAP-ENV:Body><ns1:{op}Response>{inner}</ns1:{op}Response></SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
            ns = DELEGATION_NAMESPACE,
            op = operation,
            inner = inner,
        )
    }

    pub fn termination_time(value: &str) -> String {
        response(
            "getTerminationTime",
            &format!("<getTerminationTimeReturn>{}</getTerminationTimeReturn>", value),
        )
    }

    pub fn proxy_request(operation: &str, pem: &str) -> String {
        response(operation, &format!("<{0}Return>{1}</{0}Return>", operation, pem))
    }

    pub fn put_proxy_ack() -> String {
        response("putProxy", "")
    }

    pub fn fault(message: &str, detail: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="{ns}"><SOAP-ENV:Body><SOAP-ENV:Fault><faultcode>SOAP-ENV:Server</faultcode><faultstring>{message}</faultstring><detail><ns1:DelegationException><msg>{detail}</msg></ns1:DelegationException></detail></SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
            ns = DELEGATION_NAMESPACE,
            message = message,
            detail = detail,
        )
    }
}
