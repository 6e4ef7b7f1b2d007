//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for validating delegation identifiers
static DELEGATION_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]*$").unwrap()
});

/// Regex for validating delegation endpoint URLs
static ENDPOINT_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^/\s?#]+(/[^\s]*)?$").unwrap()
});

/// Validate a delegation identifier
pub fn validate_delegation_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 255 && DELEGATION_ID_REGEX.is_match(id)
}

/// Validate a delegation endpoint URL
pub fn validate_endpoint_url(url: &str) -> bool {
    url.len() <= 2048 && ENDPOINT_URL_REGEX.is_match(url)
}
