use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{codes, ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single request to a wallet backend
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            timeout,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> ProviderResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ProviderError::response_shape(
                codes::INVALID_RESPONSE,
                format!("Response body is not valid JSON: {}", e),
            )
        })
    }
}

/// Sends requests to a wallet backend. A transport reports network failures
/// and timeouts as errors; any HTTP status, success or not, is a response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ProviderResult<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> ProviderResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("daznode/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::configuration(
                    codes::NETWORK_ERROR,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self { client })
    }

    async fn execute(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        if let Some(body) = &request.body {
            let payload = serde_json::to_vec(body).map_err(|e| {
                ProviderError::network(format!("Failed to encode request body: {}", e))
            })?;
            builder = builder.body(payload);
        }

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        debug!(
            url = %request.url,
            status = status,
            body_len = body.len(),
            "Wallet backend responded"
        );

        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        let timeout = request.timeout;
        // reqwest's own timeout does not cover every body read path, so the
        // whole exchange is bounded as well
        match tokio::time::timeout(timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "Request timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(format!("Request timed out after {}ms", timeout.as_millis()))
    } else {
        ProviderError::network(format!("Request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::error::ProviderErrorKind;

    /// Read one HTTP/1.1 request, headers and `Content-Length` body
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    async fn respond(stream: &mut TcpStream, status_line: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Hold the connection open without ever answering
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let transport = ReqwestTransport::new().unwrap();
        let started = Instant::now();
        let result = transport
            .send(HttpRequest::get(
                format!("http://{}/api/v1/wallet", addr),
                Duration::from_millis(200),
            ))
            .await;
        let elapsed = started.elapsed();

        let err = result.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Transport);
        assert_eq!(err.code, Some(codes::TIMEOUT));
        assert!(err.is_retryable());
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);

        server.abort();
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .send(HttpRequest::get(
                format!("http://{}/api/v1/wallet", addr),
                Duration::from_secs(5),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Transport);
        assert_eq!(err.code, Some(codes::NETWORK_ERROR));
    }

    #[tokio::test]
    async fn test_post_sends_headers_and_json_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            respond(
                &mut stream,
                "201 Created",
                r#"{"payment_hash":"abc","payment_request":"lnbc1"}"#,
            )
            .await;
            request
        });

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .send(
                HttpRequest::post(
                    format!("http://{}/api/v1/payments", addr),
                    json!({"out": false, "amount": 1000, "memo": "Coffee"}),
                    Duration::from_secs(5),
                )
                .header("X-Api-Key", "invoice-key")
                .header("Content-Type", "application/json"),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert!(response.is_success());
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["payment_hash"], "abc");

        let request = server.await.unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /api/v1/payments HTTP/1.1"));
        assert!(lowered.contains("x-api-key: invoice-key"));
        assert!(lowered.contains("content-type: application/json"));
        assert!(lowered.contains("user-agent: daznode/"));

        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent, json!({"out": false, "amount": 1000, "memo": "Coffee"}));
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            respond(&mut stream, "502 Bad Gateway", r#"{"detail":"upstream down"}"#).await;
        });

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .send(HttpRequest::get(
                format!("http://{}/api/v1/wallet", addr),
                Duration::from_secs(5),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, 502);
        assert!(!response.is_success());
        assert!(response.body.contains("upstream down"));
        server.await.unwrap();
    }
}
