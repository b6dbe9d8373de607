//! Optional capabilities the crawler can delegate to.
//!
//! Both capabilities are selected when the engine is built. The `No*` variants
//! always report [`CapabilityError::Unavailable`], so callers never have to
//! check whether a capability exists before using it.

use crate::error::CapabilityError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Produces a short caption for raster image bytes.
#[async_trait]
pub trait MediaCaptioner: Send + Sync {
    async fn caption(&self, image: &[u8]) -> Result<String, CapabilityError>;
}

/// Compresses page text into a shorter rendition.
#[async_trait]
pub trait TextSimplifier: Send + Sync {
    async fn simplify(&self, text: &str) -> Result<String, CapabilityError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptioner;

#[async_trait]
impl MediaCaptioner for NoCaptioner {
    async fn caption(&self, _image: &[u8]) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimplifier;

#[async_trait]
impl TextSimplifier for NoSimplifier {
    async fn simplify(&self, _text: &str) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }
}

const CAPABILITY_TIMEOUT_SECS: u64 = 60;

fn local_client() -> Result<Client, CapabilityError> {
    Client::builder()
        .timeout(Duration::from_secs(CAPABILITY_TIMEOUT_SECS))
        .no_proxy()
        .build()
        .map_err(|e| CapabilityError::Failed(format!("client setup: {}", e)))
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption: String,
}

/// Captioner backed by a local inference service.
///
/// Image bytes are POSTed as `application/octet-stream` and the service answers
/// with `{"caption": "..."}`. The service is reached directly, never through the
/// relay.
#[derive(Debug, Clone)]
pub struct HttpCaptioner {
    client: Client,
    endpoint: String,
}

impl HttpCaptioner {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: local_client()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl MediaCaptioner for HttpCaptioner {
    async fn caption(&self, image: &[u8]) -> Result<String, CapabilityError> {
        debug!(endpoint = %self.endpoint, bytes = image.len(), "requesting caption");
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CapabilityError::Failed(format!(
                "caption service returned {}",
                response.status()
            )));
        }

        let body: CaptionResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        let caption = body.caption.trim().to_string();
        if caption.is_empty() {
            return Err(CapabilityError::Failed("empty caption".to_string()));
        }
        Ok(caption)
    }
}

#[derive(Debug, Serialize)]
struct SimplifyRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SimplifyResponse {
    compressed: String,
}

/// Simplifier backed by a local prompt-compression service.
///
/// Sends `{"text": "..."}` and expects `{"compressed": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpSimplifier {
    client: Client,
    endpoint: String,
}

impl HttpSimplifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: local_client()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TextSimplifier for HttpSimplifier {
    async fn simplify(&self, text: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SimplifyRequest { text })
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CapabilityError::Failed(format!(
                "simplify service returned {}",
                response.status()
            )));
        }

        let body: SimplifyResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        Ok(body.compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    #[tokio::test]
    async fn test_no_capabilities_report_unavailable() {
        assert!(matches!(
            NoCaptioner.caption(b"bytes").await,
            Err(CapabilityError::Unavailable)
        ));
        assert!(matches!(
            NoSimplifier.simplify("text").await,
            Err(CapabilityError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_http_captioner_reads_caption() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/caption"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "caption": " a red bicycle " })),
            )
            .mount(&mock_server)
            .await;

        let captioner = HttpCaptioner::new(format!("{}/caption", mock_server.uri())).unwrap();
        let caption = captioner.caption(&[1, 2, 3]).await.unwrap();
        assert_eq!(caption, "a red bicycle");
    }

    #[tokio::test]
    async fn test_http_captioner_service_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let captioner = HttpCaptioner::new(mock_server.uri()).unwrap();
        let err = captioner.caption(&[0]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Failed(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_http_simplifier_round_trip() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compress"))
            .and(body_json(serde_json::json!({ "text": "a long text" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "compressed": "long text" })),
            )
            .mount(&mock_server)
            .await;

        let simplifier = HttpSimplifier::new(format!("{}/compress", mock_server.uri())).unwrap();
        assert_eq!(simplifier.simplify("a long text").await.unwrap(), "long text");
    }
}
