//! GridSite delegation-2 SOAP binding
//!
//! Carries the four delegation operations as SOAP 1.1 envelopes over the
//! session's HTTP client. PEM payloads travel as escaped element text and are
//! never interpreted here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::models::{CertificateSigningRequest, DelegationId, SignedProxyCertificate};
use crate::services::delegation_service::{DelegationService, RemoteFault};
use crate::services::session::SecureSession;

/// Namespace of the delegation-2 interface
pub const DELEGATION_NAMESPACE: &str = "http://www.gridsite.org/namespaces/delegation-2";

const SOAP_ENV_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP client for a GridSite delegation-2 endpoint
#[derive(Debug, Clone)]
pub struct SoapDelegationClient {
    client: Client,
    endpoint: String,
}

impl SoapDelegationClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Client bound to an established session
    pub fn from_session(session: &SecureSession) -> Self {
        Self::new(session.client().clone(), session.endpoint())
    }

    async fn call(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
    ) -> Result<SoapBody, RemoteFault> {
        let envelope = build_envelope(operation, params);

        debug!(operation, endpoint = %self.endpoint, "Sending delegation call");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(envelope)
            .send()
            .await
            .map_err(|e| RemoteFault::transport(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            RemoteFault::transport(format!("{} response unreadable: {}", operation, e))
        })?;

        let body = match SoapBody::parse(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(RemoteFault::transport(format!(
                    "{} returned HTTP status {}",
                    operation, status
                )));
            }
            Err(fault) => return Err(fault),
        };

        if let Some(fault) = body.fault() {
            debug!(operation, %fault, "Delegation endpoint returned a fault");
            return Err(fault);
        }

        if !status.is_success() {
            return Err(RemoteFault::transport(format!(
                "{} returned HTTP status {}",
                operation, status
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl DelegationService for SoapDelegationClient {
    async fn query_termination_time(&self, id: &DelegationId) -> Result<DateTime<Utc>, RemoteFault> {
        let body = self
            .call("getTerminationTime", &[("delegationID", id.as_str())])
            .await?;
        let value = body.text("getTerminationTimeReturn").ok_or_else(|| {
            RemoteFault::new(Some("client"), "getTerminationTime response has no return value")
        })?;
        parse_termination_time(value)
    }

    async fn request_fresh_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault> {
        let body = self
            .call("getProxyReq", &[("delegationID", id.as_str())])
            .await?;
        Ok(CertificateSigningRequest::new(
            body.text("getProxyReqReturn").unwrap_or_default(),
        ))
    }

    async fn request_renewal_csr(
        &self,
        id: &DelegationId,
    ) -> Result<CertificateSigningRequest, RemoteFault> {
        let body = self
            .call("renewProxyReq", &[("delegationID", id.as_str())])
            .await?;
        Ok(CertificateSigningRequest::new(
            body.text("renewProxyReqReturn").unwrap_or_default(),
        ))
    }

    async fn upload_signed_certificate(
        &self,
        id: &DelegationId,
        proxy: &SignedProxyCertificate,
    ) -> Result<(), RemoteFault> {
        self.call(
            "putProxy",
            &[("delegationID", id.as_str()), ("proxy", proxy.as_str())],
        )
        .await?;
        Ok(())
    }
}

fn build_envelope(operation: &str, params: &[(&str, &str)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(&format!(
        r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{}" xmlns:tns="{}"><SOAP-ENV:Body><tns:{}>"#,
        SOAP_ENV_NAMESPACE, DELEGATION_NAMESPACE, operation
    ));
    for (name, value) in params {
        xml.push_str(&format!("<{0}>{1}</{0}>", name, escape(*value)));
    }
    xml.push_str(&format!("</tns:{}></SOAP-ENV:Body></SOAP-ENV:Envelope>", operation));
    xml
}

/// Element texts of a SOAP response, keyed by local name
#[derive(Debug, Default)]
struct SoapBody {
    texts: HashMap<String, String>,
    detail: Vec<String>,
    has_fault: bool,
}

impl SoapBody {
    fn parse(xml: &str) -> Result<Self, RemoteFault> {
        let mut reader = Reader::from_str(xml);
        let mut body = SoapBody::default();
        let mut stack: Vec<String> = Vec::new();
        let mut in_detail = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    body.open(&name);
                    if name.eq_ignore_ascii_case("detail") {
                        in_detail += 1;
                    }
                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    body.open(&name);
                }
                Ok(Event::End(_)) => {
                    if let Some(name) = stack.pop() {
                        if name.eq_ignore_ascii_case("detail") {
                            in_detail = in_detail.saturating_sub(1);
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| {
                        RemoteFault::new(Some("client"), format!("malformed SOAP response: {}", e))
                    })?;
                    body.append(stack.last(), &text, in_detail > 0);
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    body.append(stack.last(), &text, in_detail > 0);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(RemoteFault::new(
                        Some("client"),
                        format!("malformed SOAP response: {}", e),
                    ))
                }
                _ => {}
            }
        }

        if !body.texts.contains_key("Envelope") {
            return Err(RemoteFault::new(
                Some("client"),
                "response is not a SOAP envelope",
            ));
        }

        Ok(body)
    }

    fn open(&mut self, name: &str) {
        if name == "Fault" {
            self.has_fault = true;
        }
        self.texts.entry(name.to_string()).or_default();
    }

    fn append(&mut self, element: Option<&String>, text: &str, in_detail: bool) {
        if let Some(element) = element {
            if let Some(entry) = self.texts.get_mut(element) {
                entry.push_str(text);
            }
        }
        if in_detail && !text.trim().is_empty() {
            self.detail.push(text.trim().to_string());
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    fn fault(&self) -> Option<RemoteFault> {
        if !self.has_fault {
            return None;
        }
        let code = self
            .text("faultcode")
            .or_else(|| self.text("Value"))
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let message = self
            .text("faultstring")
            .or_else(|| self.text("Text"))
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("unspecified SOAP fault");

        let mut fault = RemoteFault::new(code, message);
        if !self.detail.is_empty() {
            fault = fault.with_detail(self.detail.join("; "));
        }
        Some(fault)
    }
}

/// Parse an xsd:dateTime (or bare Unix timestamp) termination time
fn parse_termination_time(value: &str) -> Result<DateTime<Utc>, RemoteFault> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Some(dt) = value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return Ok(dt);
    }

    Err(RemoteFault::new(
        Some("client"),
        format!("unparsable termination time: {:?}", value),
    ))
}
