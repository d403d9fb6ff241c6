//! URL validation for configured endpoints
//!
//! The signaling endpoint and tool endpoints are plain HTTP(S) URLs supplied
//! by configuration. They must parse, use `http` or `https` and name a host.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

use crate::core::realtime::RealtimeError;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be http or https, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,
}

impl From<UrlValidationError> for RealtimeError {
    fn from(err: UrlValidationError) -> Self {
        RealtimeError::InvalidConfiguration(err.to_string())
    }
}

/// Parse and validate an endpoint URL
///
/// # Returns
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlValidationError)` - If the URL is malformed, uses another scheme or has no host
///
/// # Example
/// ```rust
/// use waav_voice_engine::utils::validate_endpoint_url;
///
/// assert!(validate_endpoint_url("https://voice.example.com/api/offer").is_ok());
/// assert!(validate_endpoint_url("ws://voice.example.com").is_err());
/// ```
pub fn validate_endpoint_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url.trim())?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }

    match parsed.host() {
        None => Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) if domain.is_empty() => Err(UrlValidationError::MissingHost),
        Some(_) => Ok(parsed),
    }
}

/// Whether the URL points at this machine (`localhost` or a loopback IP)
pub fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint_url_https() {
        let url = validate_endpoint_url("https://voice.example.com/api/offer").unwrap();
        assert_eq!(url.host_str(), Some("voice.example.com"));
    }

    #[test]
    fn test_validate_endpoint_url_http_allowed() {
        assert!(validate_endpoint_url("http://localhost:3000/api/voice/offer").is_ok());
    }

    #[test]
    fn test_validate_endpoint_url_trims() {
        assert!(validate_endpoint_url("  https://example.com/tool  ").is_ok());
    }

    #[test]
    fn test_validate_endpoint_url_invalid_format() {
        let result = validate_endpoint_url("not a url");
        assert!(matches!(result, Err(UrlValidationError::InvalidFormat(_))));
    }

    #[test]
    fn test_validate_endpoint_url_scheme() {
        let result = validate_endpoint_url("wss://example.com/socket");
        assert!(matches!(result, Err(UrlValidationError::UnsupportedScheme(s)) if s == "wss"));
    }

    #[test]
    fn test_validate_endpoint_url_missing_host() {
        let result = validate_endpoint_url("file:///tmp/offer");
        assert!(result.is_err());
    }

    #[test]
    fn test_is_loopback_host() {
        let local = Url::parse("http://localhost:3000").unwrap();
        let v4 = Url::parse("http://127.0.0.1:3000").unwrap();
        let v6 = Url::parse("http://[::1]:3000").unwrap();
        let remote = Url::parse("http://voice.example.com").unwrap();
        assert!(is_loopback_host(&local));
        assert!(is_loopback_host(&v4));
        assert!(is_loopback_host(&v6));
        assert!(!is_loopback_host(&remote));
    }

    #[test]
    fn test_error_converts_to_invalid_configuration() {
        let err: RealtimeError = UrlValidationError::MissingHost.into();
        assert_eq!(
            err,
            RealtimeError::InvalidConfiguration("URL must have a host".to_string())
        );
    }
}
