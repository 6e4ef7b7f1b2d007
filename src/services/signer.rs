//! Local proxy signing
//!
//! Turns the endpoint's certificate signing request into an RFC 3820 proxy
//! certificate issued by the user's own credential. The endpoint's private
//! key never leaves the endpoint; only its public key is certified here.
//!
//! The issuer name is copied from the user certificate as encoded, so grid
//! DNs with repeated `DC`, `OU` or `CN` attributes (and proxies used as
//! credentials) chain correctly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pkcs8::PrivateKeyInfo;
use rand::Rng;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING, RSA_PKCS1_SHA256,
};
use tracing::debug;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::der::asn1::{
    Any, BitString, GeneralizedTime, ObjectIdentifier, OctetString, PrintableStringRef, SetOfVec,
    UtcTime,
};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{DateTime, Decode, DecodePem, Encode, EncodePem};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RelativeDistinguishedName};
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::{Time, Validity};

use crate::models::{CertificateSigningRequest, SignedProxyCertificate};
use crate::services::credential::{LoadedCredential, RSA_ENCRYPTION};
use crate::utils::error::SigningError;

/// id-pe-proxyCertInfo
const PROXY_CERT_INFO: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.14");

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// ProxyCertInfo ::= SEQUENCE { proxyPolicy SEQUENCE { id-ppl-inheritAll } }
const PROXY_CERT_INFO_INHERIT_ALL: &[u8] = &[
    0x30, 0x0c, 0x30, 0x0a, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x15, 0x01,
];

/// Signing facility producing proxy certificates from CSRs
pub trait ProxySigner: Send + Sync {
    /// Sign `request`, valid from now for exactly `lifetime`
    fn sign(
        &self,
        request: &CertificateSigningRequest,
        lifetime: Duration,
    ) -> Result<SignedProxyCertificate, SigningError>;
}

/// Signs proxies with the user's X.509 credential
pub struct X509ProxySigner<'a> {
    credential: &'a LoadedCredential,
}

impl<'a> X509ProxySigner<'a> {
    pub fn new(credential: &'a LoadedCredential) -> Self {
        Self { credential }
    }
}

impl ProxySigner for X509ProxySigner<'_> {
    fn sign(
        &self,
        request: &CertificateSigningRequest,
        lifetime: Duration,
    ) -> Result<SignedProxyCertificate, SigningError> {
        if request.is_empty() {
            return Err(SigningError::EmptyRequest);
        }

        let csr = CertReq::from_pem(request.as_str())
            .map_err(|e| SigningError::InvalidRequest(e.to_string()))?;

        let issuer_key = IssuerKey::from_pkcs8(self.credential.key_der())?;
        let issuer = Certificate::from_der(self.credential.leaf().as_ref())
            .map_err(|e| SigningError::InvalidIssuer(e.to_string()))?;

        let serial = proxy_serial();
        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&serial.to_be_bytes())?,
            signature: issuer_key.algorithm(),
            issuer: issuer.tbs_certificate.subject.clone(),
            validity: validity(lifetime)?,
            subject: proxy_subject(&issuer.tbs_certificate.subject, serial)?,
            subject_public_key_info: csr.info.public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(vec![
                extension(BasicConstraints::OID, true, &BasicConstraints {
                    ca: false,
                    path_len_constraint: None,
                })?,
                extension(
                    KeyUsage::OID,
                    true,
                    &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment),
                )?,
                extension(
                    AuthorityKeyIdentifier::OID,
                    false,
                    &authority_key_identifier(&issuer)?,
                )?,
                Extension {
                    extn_id: PROXY_CERT_INFO,
                    critical: true,
                    extn_value: OctetString::new(PROXY_CERT_INFO_INHERIT_ALL)?,
                },
            ]),
        };

        let proxy = sign_certificate(tbs, &issuer_key)?;

        debug!(serial, lifetime_secs = lifetime.as_secs(), "Signed proxy certificate");

        let mut pem = proxy.to_pem(LineEnding::LF)?;
        if !pem.ends_with('\n') {
            pem.push('\n');
        }
        pem.push_str(self.credential.chain_pem());

        Ok(SignedProxyCertificate::new(pem))
    }
}

/// Private key of the issuing credential, as `ring` signs with it
enum IssuerKey {
    Rsa(RsaKeyPair),
    Ecdsa {
        key: EcdsaKeyPair,
        algorithm: ObjectIdentifier,
    },
}

impl IssuerKey {
    fn from_pkcs8(der: &[u8]) -> Result<Self, SigningError> {
        let info =
            PrivateKeyInfo::try_from(der).map_err(|e| SigningError::InvalidIssuer(e.to_string()))?;
        let rejected = |e: ring::error::KeyRejected| SigningError::InvalidIssuer(e.to_string());

        if info.algorithm.oid == RSA_ENCRYPTION {
            return Ok(IssuerKey::Rsa(RsaKeyPair::from_pkcs8(der).map_err(rejected)?));
        }
        if info.algorithm.oid != EC_PUBLIC_KEY {
            return Err(SigningError::InvalidIssuer(format!(
                "unsupported key algorithm {}",
                info.algorithm.oid
            )));
        }

        let curve = info
            .algorithm
            .parameters_oid()
            .map_err(|e| SigningError::InvalidIssuer(e.to_string()))?;
        let (signing, algorithm): (&'static EcdsaSigningAlgorithm, _) = if curve == SECP256R1 {
            (&ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_WITH_SHA256)
        } else if curve == SECP384R1 {
            (&ECDSA_P384_SHA384_ASN1_SIGNING, ECDSA_WITH_SHA384)
        } else {
            return Err(SigningError::InvalidIssuer(format!("unsupported curve {}", curve)));
        };

        let key = EcdsaKeyPair::from_pkcs8(signing, der, &SystemRandom::new()).map_err(rejected)?;
        Ok(IssuerKey::Ecdsa { key, algorithm })
    }

    fn algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            IssuerKey::Rsa(_) => AlgorithmIdentifierOwned {
                oid: SHA256_WITH_RSA,
                parameters: Some(Any::null()),
            },
            IssuerKey::Ecdsa { algorithm, .. } => AlgorithmIdentifierOwned {
                oid: *algorithm,
                parameters: None,
            },
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        let rng = SystemRandom::new();
        let failed = |_| SigningError::Generation("signature computation failed".to_string());
        match self {
            IssuerKey::Rsa(key) => {
                let mut signature = vec![0; key.public().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)
                    .map_err(failed)?;
                Ok(signature)
            }
            IssuerKey::Ecdsa { key, .. } => Ok(key
                .sign(&rng, message)
                .map_err(failed)?
                .as_ref()
                .to_vec()),
        }
    }
}

/// Sign `tbs` with `key`, overriding its signature algorithm to match
fn sign_certificate(
    mut tbs: TbsCertificate,
    key: &IssuerKey,
) -> Result<Certificate, SigningError> {
    tbs.signature = key.algorithm();
    let signature = key.sign(&tbs.to_der()?)?;
    Ok(Certificate {
        tbs_certificate: tbs,
        signature_algorithm: key.algorithm(),
        signature: BitString::from_bytes(&signature)?,
    })
}

/// Issuer subject followed by one more CN RDN holding the serial
fn proxy_subject(issuer: &Name, serial: u64) -> Result<Name, SigningError> {
    let serial = serial.to_string();
    let common_name = AttributeTypeAndValue {
        oid: COMMON_NAME,
        value: Any::encode_from(&PrintableStringRef::new(&serial)?)?,
    };

    let mut subject = issuer.clone();
    subject
        .0
        .push(RelativeDistinguishedName(SetOfVec::try_from(vec![common_name])?));
    Ok(subject)
}

/// Key identifier of the issuer: its SKI, or the SHA-1 of its public key
fn authority_key_identifier(issuer: &Certificate) -> Result<AuthorityKeyIdentifier, SigningError> {
    let tbs = &issuer.tbs_certificate;
    let ski = tbs
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID);

    let key_identifier = match ski {
        Some(ext) => SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())?.0,
        None => {
            let public_key = tbs.subject_public_key_info.subject_public_key.raw_bytes();
            OctetString::new(digest(&SHA1_FOR_LEGACY_USE_ONLY, public_key).as_ref())?
        }
    };

    Ok(AuthorityKeyIdentifier {
        key_identifier: Some(key_identifier),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    })
}

fn extension<T: Encode>(
    oid: ObjectIdentifier,
    critical: bool,
    value: &T,
) -> Result<Extension, SigningError> {
    Ok(Extension {
        extn_id: oid,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

/// Validity starting at the current whole second and lasting exactly `lifetime`
fn validity(lifetime: Duration) -> Result<Validity, SigningError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SigningError::Generation(e.to_string()))?;
    let not_before = Duration::from_secs(now.as_secs());
    let not_after = not_before.checked_add(lifetime).ok_or_else(|| {
        SigningError::Generation(format!("lifetime out of range: {:?}", lifetime))
    })?;

    Ok(Validity {
        not_before: asn1_time(not_before)?,
        not_after: asn1_time(not_after)?,
    })
}

/// UTCTime until 2049, GeneralizedTime afterwards
fn asn1_time(since_epoch: Duration) -> Result<Time, SigningError> {
    let date_time = DateTime::from_unix_duration(since_epoch)?;
    Ok(match UtcTime::from_date_time(date_time) {
        Ok(utc) => Time::UtcTime(utc),
        Err(_) => Time::GeneralTime(GeneralizedTime::from_date_time(date_time)),
    })
}

/// Positive serial with a non-zero leading byte
fn proxy_serial() -> u64 {
    rand::thread_rng().gen_range((1u64 << 56)..(1u64 << 63))
}
