//! One-shot offer/answer exchange with the signaling endpoint.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::core::realtime::{DEFAULT_SIGNALING_URL, DEFAULT_VOICE_HEADER, RealtimeError, RealtimeResult};
use crate::utils::url_validation::{is_loopback_host, validate_endpoint_url};

/// Content type of session description bodies.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Default request timeout for the exchange.
pub const DEFAULT_SIGNALING_TIMEOUT_SECS: u64 = 15;

/// Signaling endpoint settings.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Header carrying the selected voice
    pub voice_header: String,
    pub timeout: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SIGNALING_URL.to_string(),
            token: None,
            voice_header: DEFAULT_VOICE_HEADER.to_string(),
            timeout: Duration::from_secs(DEFAULT_SIGNALING_TIMEOUT_SECS),
        }
    }
}

/// HTTP client for the offer/answer exchange.
#[derive(Debug, Clone)]
pub struct SignalingClient {
    config: SignalingConfig,
    http: reqwest::Client,
}

impl SignalingClient {
    pub fn new(config: SignalingConfig) -> RealtimeResult<Self> {
        let url = validate_endpoint_url(&config.url)?;
        if url.scheme() == "http" && config.token.is_some() && !is_loopback_host(&url) {
            warn!("Signaling token will be sent over plain HTTP to {}", url);
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                RealtimeError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, http })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// POST the offer and return the validated answer SDP.
    ///
    /// # Errors
    /// `RealtimeError::Signaling` on transport failure, a non-success
    /// status, an empty body or an answer missing its session markers.
    pub async fn exchange(&self, offer_sdp: &str, voice: Option<&str>) -> RealtimeResult<String> {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_string());

        if let Some(voice) = voice
            && !self.config.voice_header.is_empty()
        {
            request = request.header(self.config.voice_header.as_str(), voice);
        }
        if let Some(token) = self.config.token.as_deref() {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        debug!("Posting offer to {}", self.config.url);
        let response = request
            .send()
            .await
            .map_err(|e| RealtimeError::Signaling(format!("Voice service unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RealtimeError::Signaling(format!("Failed to read answer: {e}")))?;

        if !status.is_success() {
            return Err(RealtimeError::Signaling(format!(
                "Voice service error ({}): {}",
                status.as_u16(),
                body.trim()
            )));
        }

        validate_answer(&body)?;
        info!("Received answer ({} bytes)", body.len());
        Ok(body)
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.config.token {
            token.zeroize();
        }
    }
}

/// Check that an answer carries a version line and at least one media line.
pub fn validate_answer(sdp: &str) -> RealtimeResult<()> {
    if sdp.trim().is_empty() {
        return Err(RealtimeError::Signaling(
            "Voice service response was empty".to_string(),
        ));
    }
    let mut has_version = false;
    let mut has_media = false;
    for line in sdp.lines().map(str::trim_start) {
        has_version |= line.starts_with("v=");
        has_media |= line.starts_with("m=");
    }
    if !has_version || !has_media {
        return Err(RealtimeError::Signaling(
            "Voice service answer is missing session description markers".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANSWER: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";

    fn client_for(server: &MockServer, token: Option<&str>) -> SignalingClient {
        SignalingClient::new(SignalingConfig {
            url: format!("{}/api/voice/offer", server.uri()),
            token: token.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_validate_answer() {
        assert!(validate_answer(ANSWER).is_ok());
        assert_eq!(
            validate_answer("  \n").unwrap_err(),
            RealtimeError::Signaling("Voice service response was empty".to_string())
        );
        assert!(validate_answer("v=0\r\ns=-\r\n").is_err());
        assert!(validate_answer("m=audio 9 RTP 111\r\n").is_err());
        assert!(validate_answer("<html>bad gateway</html>").is_err());
    }

    #[tokio::test]
    async fn test_exchange_posts_offer_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/voice/offer"))
            .and(header("content-type", SDP_CONTENT_TYPE))
            .and(header(DEFAULT_VOICE_HEADER, "shimmer"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_string("v=0 offer"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret-token"));
        let answer = client.exchange("v=0 offer", Some("shimmer")).await.unwrap();
        assert_eq!(answer, ANSWER);
    }

    #[tokio::test]
    async fn test_exchange_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).exchange("offer", None).await.unwrap_err();
        assert_eq!(
            err,
            RealtimeError::Signaling("Voice service error (502): upstream down".to_string())
        );
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_exchange_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client_for(&server, None).exchange("offer", None).await.unwrap_err();
        assert!(err.to_string().contains("Voice service response was empty"));
    }

    #[tokio::test]
    async fn test_exchange_rejects_malformed_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).exchange("offer", None).await.unwrap_err();
        assert!(matches!(err, RealtimeError::Signaling(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_signaling_error() {
        let client = SignalingClient::new(SignalingConfig {
            url: "http://127.0.0.1:1/offer".to_string(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let err = client.exchange("offer", None).await.unwrap_err();
        assert!(matches!(err, RealtimeError::Signaling(_)));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let err = SignalingClient::new(SignalingConfig {
            url: "ftp://example.com/offer".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RealtimeError::InvalidConfiguration(_)));
    }
}
