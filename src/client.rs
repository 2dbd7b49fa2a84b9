use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde_json::Value;
use url::Url;

use crate::client_logger::TurnLogger;
use crate::error::{Error, Result};
use crate::observability::{BACKEND_REQUEST_DURATION, BACKEND_REQUEST_ERRORS, BACKEND_REQUESTS};
use crate::types::{ChatReply, ChatRequest};

/// Base URL used when none is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/";

/// Environment variable consulted for the base URL.
pub const API_BASE_ENV: &str = "ZUSCHAT_API_BASE";

const CHAT_PATH: &str = "api/chat";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A remote chat backend that answers one question per call.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ask a question and interpret the answer.
    ///
    /// A non-success status yields [`Error::Api`]; transport and decoding
    /// failures yield the transport variants of [`Error`].
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply>;
}

/// HTTP client for the chat backend's `POST /api/chat` endpoint.
#[derive(Clone)]
pub struct HttpBackend {
    client: ReqwestClient,
    endpoint: Url,
    timeout: Duration,
    logger: Option<Arc<dyn TurnLogger>>,
}

impl HttpBackend {
    /// Create a new backend client.
    ///
    /// The base URL can be provided directly or read from the ZUSCHAT_API_BASE
    /// environment variable, falling back to `http://localhost:8000/`.
    pub fn new(api_base: Option<String>) -> Result<Self> {
        Self::with_options(api_base, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(api_base: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let api_base = api_base
            .or_else(|| env::var(API_BASE_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let endpoint = chat_endpoint(&api_base)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that sees every request, response and failure.
    pub fn with_logger(mut self, logger: Arc<dyn TurnLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();
        let reason = status.canonical_reason().unwrap_or_default().to_string();

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(_) => return Error::api(status_code, reason),
        };

        // FastAPI reports failures as {"detail": ...}
        let detail = serde_json::from_str::<Value>(&error_body)
            .ok()
            .and_then(|body| body.get("detail").cloned())
            .map(|detail| match detail {
                Value::String(text) => text,
                other => other.to_string(),
            });
        let message = match detail {
            Some(detail) => detail,
            None if !error_body.trim().is_empty() => error_body.trim().to_string(),
            None => reason,
        };
        Error::api(status_code, message)
    }

    async fn post(&self, request: &ChatRequest) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("{}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<Value>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply> {
        BACKEND_REQUESTS.click();
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        let start = Instant::now();
        let result = self.post(request).await;
        BACKEND_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        match result {
            Ok(body) => {
                if let Some(logger) = &self.logger {
                    logger.log_response(request, &body);
                }
                Ok(ChatReply::from_value(body))
            }
            Err(err) => {
                BACKEND_REQUEST_ERRORS.click();
                if let Some(logger) = &self.logger {
                    logger.log_failure(request, &err);
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Resolve the chat endpoint relative to a base URL.
///
/// The base is treated as a directory, so `http://host/prefix` and
/// `http://host/prefix/` both resolve to `http://host/prefix/api/chat`.
fn chat_endpoint(api_base: &str) -> Result<Url> {
    let mut base = Url::parse(api_base.trim())?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(CHAT_PATH)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves exactly one HTTP response and hands back the request body it received.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break request.len();
                }
                request.extend_from_slice(&chunk[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break end + 4;
                }
            };
            let _ = tx.send(String::from_utf8_lossy(&request[body_start..]).to_string());
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn endpoint_resolution() {
        let backend = HttpBackend::new(Some("http://localhost:8000".to_string())).unwrap();
        assert_eq!(backend.endpoint().as_str(), "http://localhost:8000/api/chat");

        let backend = HttpBackend::new(Some("https://example.com/zus".to_string())).unwrap();
        assert_eq!(backend.endpoint().as_str(), "https://example.com/zus/api/chat");

        let backend = HttpBackend::new(Some("https://example.com/zus/".to_string())).unwrap();
        assert_eq!(backend.endpoint().as_str(), "https://example.com/zus/api/chat");
    }

    #[test]
    fn invalid_base_is_a_url_error() {
        let err = HttpBackend::new(Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn custom_timeout_is_kept() {
        let backend = HttpBackend::with_options(
            Some(DEFAULT_API_BASE.to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(backend.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn success_body_is_interpreted() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"message":"Hello","debug":{"planner_action":["Greet","Finish"]}}"#,
        )
        .await;
        let backend = HttpBackend::new(Some(base)).unwrap();
        let reply = backend.ask(&ChatRequest::new("/calc 2+2")).await.unwrap();
        assert_eq!(reply.answer, "Hello");
        assert_eq!(
            reply.planner,
            Some(vec!["Greet".to_string(), "Finish".to_string()])
        );
        let sent: Value = serde_json::from_str(&request.await.unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"question": "/calc 2+2"}));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let (base, _request) =
            serve_once("500 Internal Server Error", r#"{"detail":"planner crashed"}"#).await;
        let backend = HttpBackend::new(Some(base)).unwrap();
        let err = backend.ask(&ChatRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert!(!err.is_transport());
        assert_eq!(
            err.to_message_content(),
            "Error: Failed to get AI answer (HTTP 500): planner crashed"
        );
    }

    #[tokio::test]
    async fn undecodable_body_is_transport_error() {
        let (base, _request) = serve_once("200 OK", "not json").await;
        let backend = HttpBackend::new(Some(base)).unwrap();
        let err = backend.ask(&ChatRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let backend = HttpBackend::new(Some(format!("http://127.0.0.1:{port}/"))).unwrap();
        let err = backend.ask(&ChatRequest::new("hi")).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_message_content().starts_with("Error:"));
    }
}
