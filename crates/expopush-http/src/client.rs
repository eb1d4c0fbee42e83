//! HTTP push transport backed by `reqwest`.
//!
//! Endpoints:
//! - `POST {base}/send` with a JSON array of messages
//! - `POST {base}/getReceipts` with `{"ids": [...]}`
//!
//! Both answer `{"data": ...}` on success and `{"errors": [...]}` when the
//! request as a whole was rejected. Request bodies over
//! [`COMPRESSION_THRESHOLD`] bytes are sent gzip-compressed.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use expopush_core::error::TransportError;
use expopush_core::push::{align_receipts, ApiError, PushMessage, PushReceipt, ReceiptStatus, TicketPayload};
use expopush_core::transport::PushTransport;

pub const DEFAULT_BASE_URL: &str = "https://exp.host/--/api/v2/push";

/// Request bodies larger than this many bytes are gzip-compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

const USER_AGENT: &str = concat!("expopush-rust/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`HttpPushTransport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// API root; `/send` and `/getReceipts` are appended to it.
    pub base_url: String,
    /// Sent as a bearer token when the project has enhanced push security.
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpTransportConfig {
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        let url = self.base_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(BuildError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.request_timeout.is_zero() {
            return Err(BuildError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Errors building an [`HttpPushTransport`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("base URL must be an http(s) URL, got {0:?}")]
    InvalidBaseUrl(String),

    #[error("request timeout must be greater than 0")]
    InvalidTimeout,

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Push API transport. Cheap to share behind an `Arc`; the inner
/// `reqwest::Client` pools connections across batches.
pub struct HttpPushTransport {
    base_url: String,
    access_token: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpPushTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            access_token: config.access_token,
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// Transport for the public API with default settings.
    pub fn default_for(access_token: Option<String>) -> Result<Self, BuildError> {
        Self::new(HttpTransportConfig {
            access_token,
            ..HttpTransportConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, D>(&self, path: &str, body: &B) -> Result<D, TransportError>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let json = serde_json::to_vec(body)
            .map_err(|e| TransportError::Other(format!("failed to encode request body: {e}")))?;
        let (payload, compressed) = encode_body(json)
            .map_err(|e| TransportError::Other(format!("failed to compress request body: {e}")))?;

        let mut req = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if compressed {
            req = req.header(CONTENT_ENCODING, "gzip");
        }
        req = req.body(payload);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| self.map_reqwest(e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.map_reqwest(e))?;

        tracing::debug!(url = %url, status, bytes = body.len(), "push API response");
        parse_response(status, &body)
    }

    fn map_reqwest(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send_messages(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<TicketPayload>, TransportError> {
        if messages.is_empty() {
            return Ok(vec![]);
        }
        self.post("/send", messages).await
    }

    async fn fetch_receipts(&self, ids: &[String]) -> Result<Vec<PushReceipt>, TransportError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let data: HashMap<String, ReceiptStatus> =
            self.post("/getReceipts", &ReceiptsRequest { ids }).await?;
        Ok(align_receipts(ids, data))
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

/// Gzip `json` when it exceeds [`COMPRESSION_THRESHOLD`]; the flag tells
/// whether it was compressed.
fn encode_body(json: Vec<u8>) -> std::io::Result<(Vec<u8>, bool)> {
    if json.len() <= COMPRESSION_THRESHOLD {
        return Ok((json, false));
    }
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok((encoder.finish()?, true))
}

#[derive(Serialize)]
struct ReceiptsRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
struct ResponseBody<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// Decode a push API response body.
///
/// Any `errors` array, on any status, fails the whole request. A 429 with no
/// decodable body becomes [`TransportError::RateLimited`].
fn parse_response<D: DeserializeOwned>(status: u16, body: &str) -> Result<D, TransportError> {
    if !(200..300).contains(&status) {
        let errors = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.errors)
            .unwrap_or_default();
        if errors.is_empty() {
            if status == 429 {
                return Err(TransportError::RateLimited);
            }
            return Err(TransportError::Http(format!("HTTP {status}: {}", snippet(body))));
        }
        return Err(TransportError::Api { status, errors });
    }

    let parsed: ResponseBody<D> = serde_json::from_str(body)?;
    if !parsed.errors.is_empty() {
        return Err(TransportError::Api {
            status,
            errors: parsed.errors,
        });
    }
    parsed
        .data
        .ok_or_else(|| TransportError::Other("response has neither data nor errors".into()))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expopush_core::push::{DeliveryErrorCode, PushErrorCode};

    #[test]
    fn parses_ticket_data() {
        let body = r#"{"data": [
            {"status": "ok", "id": "r-1"},
            {"status": "error", "message": "gone", "details": {"error": "DeviceNotRegistered"}}
        ]}"#;
        let tickets: Vec<TicketPayload> = parse_response(200, body).unwrap();
        assert_eq!(tickets[0], TicketPayload::Ok { id: "r-1".into() });
        match &tickets[1] {
            TicketPayload::Error { details, .. } => {
                assert_eq!(details.error, DeliveryErrorCode::DeviceNotRegistered)
            }
            other => panic!("expected error ticket, got {other:?}"),
        }
    }

    #[test]
    fn error_body_keeps_all_sub_errors() {
        let body = r#"{"errors": [
            {"code": "PUSH_TOO_MANY_NOTIFICATIONS", "message": "over 100"},
            {"code": "TOO_MANY_REQUESTS", "message": "slow down"}
        ]}"#;
        let err = parse_response::<Vec<TicketPayload>>(400, body).unwrap_err();
        match err {
            TransportError::Api { status, errors } => {
                assert_eq!(status, 400);
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[1].code, PushErrorCode::TooManyRequests);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn errors_on_success_status_still_fail() {
        let body = r#"{"errors": [{"code": "PUSH_TOO_MANY_EXPERIENCE_IDS", "message": "mixed"}]}"#;
        let err = parse_response::<Vec<TicketPayload>>(200, body).unwrap_err();
        assert!(matches!(err, TransportError::Api { status: 200, .. }));
    }

    #[test]
    fn bare_429_is_rate_limited() {
        let err = parse_response::<Vec<TicketPayload>>(429, "Too Many Requests").unwrap_err();
        assert!(matches!(err, TransportError::RateLimited));
    }

    #[test]
    fn unstructured_failure_is_http_error() {
        let err = parse_response::<Vec<TicketPayload>>(502, "<html>bad gateway</html>").unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn malformed_success_body_is_deserialization_error() {
        let err = parse_response::<Vec<TicketPayload>>(200, "not json").unwrap_err();
        assert!(matches!(err, TransportError::Deserialization(_)));
    }

    #[test]
    fn receipts_map_parses() {
        let body = r#"{"data": {"a": {"status": "ok"}, "b": {"status": "error", "message": "x"}}}"#;
        let data: HashMap<String, ReceiptStatus> = parse_response(200, body).unwrap();
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let receipts = align_receipts(&ids, data);
        assert!(receipts[0].is_ok());
        assert_eq!(receipts[1].error_code(), Some(DeliveryErrorCode::Unknown));
        assert!(receipts[2].is_pending());
    }

    #[test]
    fn small_body_sent_as_is() {
        let json = serde_json::to_vec(&[PushMessage::to_token("ExponentPushToken[x]")]).unwrap();
        assert!(json.len() <= COMPRESSION_THRESHOLD);

        let (payload, compressed) = encode_body(json.clone()).unwrap();
        assert!(!compressed);
        assert_eq!(payload, json);
    }

    #[test]
    fn threshold_is_exclusive() {
        let (_, compressed) = encode_body(vec![b' '; COMPRESSION_THRESHOLD]).unwrap();
        assert!(!compressed);
        let (_, compressed) = encode_body(vec![b' '; COMPRESSION_THRESHOLD + 1]).unwrap();
        assert!(compressed);
    }

    #[test]
    fn large_body_is_gzipped_and_round_trips() {
        use std::io::Read;

        let messages: Vec<PushMessage> = (0..100)
            .map(|i| PushMessage::to_token(format!("ExponentPushToken[{i}]")).with_title("Sale"))
            .collect();
        let json = serde_json::to_vec(&messages).unwrap();
        assert!(json.len() > COMPRESSION_THRESHOLD);

        let (payload, compressed) = encode_body(json.clone()).unwrap();
        assert!(compressed);
        assert!(payload.len() < json.len());
        assert_eq!(&payload[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&payload[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, json);
    }

    #[test]
    fn receipts_request_body_shape() {
        let ids = vec!["x".to_string(), "y".to_string()];
        let json = serde_json::to_value(ReceiptsRequest { ids: &ids }).unwrap();
        assert_eq!(json, serde_json::json!({"ids": ["x", "y"]}));
    }

    #[test]
    fn config_validation() {
        assert!(HttpTransportConfig::default().validate().is_ok());

        let bad_url = HttpTransportConfig {
            base_url: "exp.host".into(),
            ..HttpTransportConfig::default()
        };
        assert!(matches!(bad_url.validate(), Err(BuildError::InvalidBaseUrl(_))));

        let zero = HttpTransportConfig {
            request_timeout: Duration::ZERO,
            ..HttpTransportConfig::default()
        };
        assert!(matches!(zero.validate(), Err(BuildError::InvalidTimeout)));
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let transport = HttpPushTransport::new(HttpTransportConfig {
            base_url: "http://localhost:8080/push/".into(),
            ..HttpTransportConfig::default()
        })
        .unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080/push");
        assert_eq!(transport.name(), "http://localhost:8080/push");
    }

    #[tokio::test]
    async fn empty_requests_skip_the_network() {
        let transport = HttpPushTransport::new(HttpTransportConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..HttpTransportConfig::default()
        })
        .unwrap();
        assert!(transport.send_messages(&[]).await.unwrap().is_empty());
        assert!(transport.fetch_receipts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let transport = HttpPushTransport::new(HttpTransportConfig {
            base_url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_secs(5),
            ..HttpTransportConfig::default()
        })
        .unwrap();
        let err = transport
            .send_messages(&[PushMessage::to_token("ExponentPushToken[x]")])
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
