//! User credential and trust store loading
//!
//! Reads the PEM files behind a [`UserCredential`]: the certificate chain,
//! the private key (optionally passphrase-protected PKCS#8, or PKCS#1 RSA),
//! and the trusted CA directory.

use std::fmt;
use std::fs;
use std::io::BufReader;
use std::path::Path;

use pkcs8::der::asn1::AnyRef;
use pkcs8::der::{Document, Encode};
use pkcs8::{AlgorithmIdentifierRef, EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo};
use rcgen::KeyPair;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::models::UserCredential;
use crate::utils::error::CredentialError;

pub(crate) const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Certificate chain and private key of the delegating user
pub struct LoadedCredential {
    chain: Vec<CertificateDer<'static>>,
    chain_pem: String,
    key_der: Vec<u8>,
}

impl LoadedCredential {
    /// Load the credential files named by `credential`
    pub fn load(
        credential: &UserCredential,
        passphrase: Option<&str>,
    ) -> Result<Self, CredentialError> {
        let cert_pem = read_text(&credential.cert_path)?;
        let key_path = credential.effective_key_path();
        let key_pem = if key_path == credential.cert_path {
            cert_pem.clone()
        } else {
            read_text(key_path)?
        };

        debug!(
            cert = %credential.cert_path.display(),
            key = %key_path.display(),
            "Loading user credential"
        );

        Self::from_pem(
            &cert_pem,
            &key_pem,
            passphrase,
            &key_path.display().to_string(),
        )
    }

    /// Build from PEM text; `origin` only names the source in errors
    pub fn from_pem(
        cert_pem: &str,
        key_pem: &str,
        passphrase: Option<&str>,
        origin: &str,
    ) -> Result<Self, CredentialError> {
        let chain = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CredentialError::Io {
                path: origin.to_string(),
                source: e,
            })?;
        if chain.is_empty() {
            return Err(CredentialError::MissingCertificate(origin.to_string()));
        }

        let mut chain_pem = String::new();
        for block in pem_blocks(cert_pem, "CERTIFICATE") {
            chain_pem.push_str(block);
            chain_pem.push('\n');
        }

        let key_der = read_private_key(key_pem, passphrase, origin)?;

        // Reject keys the signer would choke on while the session is being set up.
        KeyPair::try_from(key_der.as_slice()).map_err(|e| CredentialError::UnsupportedKey {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            chain,
            chain_pem,
            key_der,
        })
    }

    /// End-entity certificate of the user
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    /// Full chain as loaded, leaf first
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Chain as PEM text, leaf first
    pub fn chain_pem(&self) -> &str {
        &self.chain_pem
    }

    /// Signing key of the user
    pub fn key_pair(&self) -> Result<KeyPair, CredentialError> {
        KeyPair::try_from(self.key_der.as_slice()).map_err(|e| CredentialError::UnsupportedKey {
            path: "<loaded credential>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Private key as PKCS#8 DER
    pub(crate) fn key_der(&self) -> &[u8] {
        &self.key_der
    }

    /// Certificate chain and unencrypted key as one PEM bundle
    pub fn identity_pem(&self) -> Result<Vec<u8>, CredentialError> {
        let key = self.key_pair()?;
        let mut bundle = self.chain_pem.clone().into_bytes();
        bundle.push(b'\n');
        bundle.extend_from_slice(key.serialize_pem().as_bytes());
        Ok(bundle)
    }
}

impl fmt::Debug for LoadedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCredential")
            .field("chain_len", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Load every PEM certificate under a CA directory (or bundle file)
pub fn load_trust_anchors(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let metadata = fs::metadata(path).map_err(|e| CredentialError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let files = if metadata.is_dir() {
        let mut files: Vec<_> = fs::read_dir(path)
            .map_err(|e| CredentialError::Io {
                path: path.display().to_string(),
                source: e,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut anchors = Vec::new();
    for file in files {
        let contents = match fs::read(&file) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %file.display(), error = %e, "Skipping unreadable CA file");
                continue;
            }
        };
        match rustls_pemfile::certs(&mut BufReader::new(contents.as_slice()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(certs) => anchors.extend(certs),
            Err(e) => debug!(path = %file.display(), error = %e, "Skipping unparsable CA file"),
        }
    }

    if anchors.is_empty() {
        return Err(CredentialError::EmptyTrustStore(path.display().to_string()));
    }

    debug!(count = anchors.len(), path = %path.display(), "Loaded trusted CA certificates");
    Ok(anchors)
}

fn read_text(path: &Path) -> Result<String, CredentialError> {
    fs::read_to_string(path).map_err(|e| CredentialError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Return the private key as PKCS#8 DER
fn read_private_key(
    pem: &str,
    passphrase: Option<&str>,
    origin: &str,
) -> Result<Vec<u8>, CredentialError> {
    if let Some(block) = pem_blocks(pem, "ENCRYPTED PRIVATE KEY").next() {
        let passphrase = passphrase
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CredentialError::PassphraseRequired(origin.to_string()))?;
        return decrypt_pkcs8(block, passphrase).map_err(|reason| CredentialError::Decrypt {
            path: origin.to_string(),
            reason,
        });
    }

    if pem.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(CredentialError::UnsupportedKey {
            path: origin.to_string(),
            reason: "legacy OpenSSL key encryption, convert the key to encrypted PKCS#8".to_string(),
        });
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(pem.as_bytes()))
        .map_err(|e| CredentialError::Io {
            path: origin.to_string(),
            source: e,
        })?
        .ok_or_else(|| CredentialError::MissingKey(origin.to_string()))?;

    match key {
        PrivateKeyDer::Pkcs8(key) => Ok(key.secret_pkcs8_der().to_vec()),
        PrivateKeyDer::Pkcs1(key) => {
            wrap_pkcs1(key.secret_pkcs1_der()).map_err(|e| CredentialError::UnsupportedKey {
                path: origin.to_string(),
                reason: e.to_string(),
            })
        }
        _ => Err(CredentialError::UnsupportedKey {
            path: origin.to_string(),
            reason: "only PKCS#8 and PKCS#1 RSA keys are supported".to_string(),
        }),
    }
}

fn decrypt_pkcs8(block: &str, passphrase: &str) -> Result<Vec<u8>, String> {
    let (_, document) = Document::from_pem(block).map_err(|e| e.to_string())?;
    let encrypted =
        EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| e.to_string())?;
    let decrypted = encrypted.decrypt(passphrase).map_err(|e| e.to_string())?;
    Ok(decrypted.as_bytes().to_vec())
}

/// Wrap a PKCS#1 RSAPrivateKey into a PKCS#8 PrivateKeyInfo
fn wrap_pkcs1(pkcs1: &[u8]) -> Result<Vec<u8>, pkcs8::der::Error> {
    let algorithm = AlgorithmIdentifierRef {
        oid: RSA_ENCRYPTION,
        parameters: Some(AnyRef::NULL),
    };
    PrivateKeyInfo::new(algorithm, pkcs1).to_der()
}

/// Iterate over the complete PEM blocks carrying `label`
fn pem_blocks<'a>(text: &'a str, label: &str) -> impl Iterator<Item = &'a str> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(&begin)?;
        let stop = rest[start..].find(&end)? + start + end.len();
        let block = &rest[start..stop];
        rest = &rest[stop..];
        Some(block)
    })
}
