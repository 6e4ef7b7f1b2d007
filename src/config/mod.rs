//! Configuration management
//!
//! YAML configuration for the delegation client with support for:
//! - Environment variable overrides (including the usual `X509_*` grid variables)
//! - Multiple configuration file locations
//! - Default values for everything except the endpoint URL

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{
    DelegationIdPolicy, DelegationRequest, TransportOptions, UserCredential, DEFAULT_DELEGATION_ID,
};
use crate::utils::validation::{validate_delegation_id, validate_endpoint_url};

/// Main delegation client configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DelegationConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub delegation: DelegationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Delegation endpoint connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub url: String,
    /// Optional whole-request timeout; none means the transport's own limits
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: None,
            ssl_verify: default_ssl_verify(),
        }
    }
}

fn default_ssl_verify() -> bool {
    true
}

/// Local credential locations
#[derive(Clone, Deserialize, Serialize)]
pub struct CredentialConfig {
    /// User certificate (or proxy file holding certificate and key)
    #[serde(default, alias = "cert")]
    pub cert_path: Option<PathBuf>,
    /// User private key, when not stored with the certificate
    #[serde(default, alias = "key")]
    pub key_path: Option<PathBuf>,
    /// Passphrase for an encrypted private key
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Trusted CA directory or bundle
    #[serde(default = "default_ca_path", alias = "ca")]
    pub ca_path: PathBuf,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("ca_path", &self.ca_path)
            .finish()
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            passphrase: None,
            ca_path: default_ca_path(),
        }
    }
}

fn default_ca_path() -> PathBuf {
    PathBuf::from("/etc/grid-security/certificates")
}

/// Delegation slot and lifetime
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelegationSettings {
    /// Fixed identifier; ignored when `random_id` is set
    #[serde(default = "default_delegation_id")]
    pub id: String,
    /// Use a fresh UUID for each attempt instead of `id`
    #[serde(default)]
    pub random_id: bool,
    /// Requested proxy lifetime in seconds
    #[serde(default = "default_lifetime", alias = "lifetime")]
    pub lifetime_secs: u64,
}

impl DelegationSettings {
    pub fn id_policy(&self) -> DelegationIdPolicy {
        if self.random_id {
            DelegationIdPolicy::Random
        } else {
            DelegationIdPolicy::Fixed(self.id.clone())
        }
    }
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            id: default_delegation_id(),
            random_id: false,
            lifetime_secs: default_lifetime(),
        }
    }
}

fn default_delegation_id() -> String {
    DEFAULT_DELEGATION_ID.to_string()
}

fn default_lifetime() -> u64 {
    12 * 3600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stderr
    #[default]
    Console,
    /// Log to file with optional rotation
    File,
    /// Log to both console and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/proxy-delegation")
}

fn default_log_prefix() -> String {
    "proxy-delegate".to_string()
}

fn default_log_rotation() -> bool {
    false
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

impl DelegationConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("PROXY_DELEGATION_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            _ => DelegationConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse one YAML file, without environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("delegation.yaml"),
            PathBuf::from("config/delegation.yaml"),
            // System config directory
            PathBuf::from("/etc/proxy-delegation/delegation.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("proxy-delegation/delegation.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Endpoint overrides
        if let Some(url) = var("DELEGATION_ENDPOINT") {
            self.endpoint.url = url;
        }

        // Credential overrides; a proxy file carries both cert and key
        if let Some(proxy) = var("X509_USER_PROXY") {
            self.credential.cert_path = Some(PathBuf::from(proxy));
            self.credential.key_path = None;
        } else {
            if let Some(cert) = var("X509_USER_CERT") {
                self.credential.cert_path = Some(PathBuf::from(cert));
            }
            if let Some(key) = var("X509_USER_KEY") {
                self.credential.key_path = Some(PathBuf::from(key));
            }
        }
        if let Some(dir) = var("X509_CERT_DIR") {
            self.credential.ca_path = PathBuf::from(dir);
        }
        if let Some(passphrase) = var("DELEGATION_PASSPHRASE") {
            self.credential.passphrase = Some(passphrase);
        }

        // Delegation overrides
        if let Some(id) = var("DELEGATION_ID") {
            self.delegation.id = id;
            self.delegation.random_id = false;
        }
        if let Some(lifetime) = var("DELEGATION_LIFETIME") {
            if let Ok(secs) = lifetime.parse() {
                self.delegation.lifetime_secs = secs;
            }
        }

        // Logging overrides
        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.url.is_empty() {
            anyhow::bail!("Delegation endpoint URL cannot be empty");
        }
        if !validate_endpoint_url(&self.endpoint.url) {
            anyhow::bail!(
                "Invalid delegation endpoint URL: {}. Must be an http(s) URL",
                self.endpoint.url
            );
        }

        if self.delegation.lifetime_secs == 0 {
            anyhow::bail!("Delegation lifetime cannot be 0");
        }
        if !self.delegation.random_id && !validate_delegation_id(&self.delegation.id) {
            anyhow::bail!("Invalid delegation id: {:?}", self.delegation.id);
        }

        if self.credential.cert_path.is_none() {
            anyhow::bail!(
                "No user certificate configured (set credential.cert_path or X509_USER_PROXY)"
            );
        }

        Ok(())
    }

    /// Build the per-attempt request from this configuration
    pub fn to_request(&self) -> Result<DelegationRequest> {
        let cert_path = self
            .credential
            .cert_path
            .clone()
            .context("No user certificate configured")?;

        let mut credential = UserCredential::new(cert_path);
        if let Some(ref key) = self.credential.key_path {
            credential = credential.with_key(key.clone());
        }

        let mut request = DelegationRequest::new(
            self.endpoint.url.clone(),
            credential,
            self.credential.ca_path.clone(),
            Duration::from_secs(self.delegation.lifetime_secs),
        )
        .with_transport(TransportOptions {
            timeout: self.endpoint.timeout_secs.map(Duration::from_secs),
            verify_peer: self.endpoint.ssl_verify,
        });
        if let Some(ref passphrase) = self.credential.passphrase {
            request = request.with_passphrase(passphrase.clone());
        }

        Ok(request)
    }
}
