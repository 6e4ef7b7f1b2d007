//! Mutual-TLS session to a delegation endpoint
//!
//! A session is owned by exactly one delegation attempt. Dropping it
//! releases the HTTP client and the loaded credential.

use reqwest::{Certificate, Client, Identity};
use tracing::{debug, info};

use crate::models::DelegationRequest;
use crate::services::credential::{load_trust_anchors, LoadedCredential};
use crate::utils::error::CredentialError;

/// Client side of an authenticated channel to one endpoint
#[derive(Debug)]
pub struct SecureSession {
    client: Client,
    endpoint: String,
    credential: LoadedCredential,
}

impl SecureSession {
    /// Build the mTLS client for `request`
    pub fn establish(request: &DelegationRequest) -> Result<Self, CredentialError> {
        let credential =
            LoadedCredential::load(&request.credential, request.passphrase.as_deref())?;

        let mut client_builder = Client::builder();

        if let Some(timeout) = request.transport.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        // Trusted CAs must be added before the identity for rustls
        for anchor in load_trust_anchors(&request.ca_path)? {
            let ca_cert = Certificate::from_der(anchor.as_ref())
                .map_err(|e| CredentialError::Tls(format!("Failed to add CA certificate: {}", e)))?;
            client_builder = client_builder.add_root_certificate(ca_cert);
        }

        let identity = Identity::from_pem(&credential.identity_pem()?)
            .map_err(|e| CredentialError::Tls(format!("Failed to create identity: {}", e)))?;
        client_builder = client_builder.identity(identity);

        // Must come after the identity for rustls compatibility
        if !request.transport.verify_peer {
            debug!("Peer verification disabled for delegation endpoint");
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| CredentialError::Tls(format!("Failed to create HTTP client: {}", e)))?;

        info!(endpoint = %request.endpoint, "Secure session established");

        Ok(Self {
            client,
            endpoint: request.endpoint.clone(),
            credential,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Credential the session authenticates with
    pub fn credential(&self) -> &LoadedCredential {
        &self.credential
    }
}
