//! Raw HTTP exchange and the transport interface.
//!
//! [`RestClient`](crate::RestClient) builds [`HttpRequest`]s and hands them
//! to an [`HttpTransport`]. The `http-client` feature provides a `reqwest`
//! implementation; tests use a scripted one.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HttpResult;
use crate::route::Method;

/// A fully built request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON, falling back to a string, or `null` when empty.
    pub fn value(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Rate-limit information carried by response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Remaining`.
    pub remaining: Option<u64>,
    /// `X-RateLimit-Reset-After`, in seconds with millisecond precision.
    pub reset_after: Option<Duration>,
    /// `X-RateLimit-Bucket`.
    pub bucket: Option<String>,
    /// `X-RateLimit-Global`.
    pub global: bool,
    /// Presence of a `Via` header, which marks responses from the real API
    /// rather than an edge block.
    pub via: bool,
}

impl RateLimitHeaders {
    /// Parses the rate-limit headers of a response.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            remaining: response
                .header("x-ratelimit-remaining")
                .and_then(|v| v.trim().parse().ok()),
            reset_after: response
                .header("x-ratelimit-reset-after")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
            bucket: response.header("x-ratelimit-bucket").map(str::to_string),
            global: response
                .header("x-ratelimit-global")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            via: response.header("via").is_some_and(|v| !v.is_empty()),
        }
    }

    /// Returns `true` if the bucket has no remaining quota.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Sends one HTTP request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse>;
}

#[cfg(feature = "http-client")]
pub use self::reqwest_impl::ReqwestTransport;

#[cfg(feature = "http-client")]
mod reqwest_impl {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{Client, ClientBuilder};

    use super::{HttpRequest, HttpResponse, HttpTransport};
    use crate::error::{HttpError, HttpResult};
    use crate::route::Method;

    /// [`HttpTransport`] backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
    }

    impl ReqwestTransport {
        /// Creates a transport with the given request timeout.
        pub fn new(timeout: Duration) -> HttpResult<Self> {
            let client = ClientBuilder::new()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limit_headers() {
        let response = HttpResponse::json(200, &json!({}))
            .with_header("X-RateLimit-Remaining", 0)
            .with_header("X-RateLimit-Reset-After", "1.250")
            .with_header("X-RateLimit-Bucket", "abc")
            .with_header("Via", "1.1 google");
        let limits = RateLimitHeaders::from_response(&response);
        assert!(limits.is_exhausted());
        assert_eq!(limits.reset_after, Some(Duration::from_millis(1250)));
        assert_eq!(limits.bucket.as_deref(), Some("abc"));
        assert!(limits.via);
        assert!(!limits.global);
    }

    #[test]
    fn test_response_value_fallbacks() {
        assert_eq!(HttpResponse::default().value(), Value::Null);
        let text = HttpResponse {
            status: 502,
            headers: vec![],
            body: b"Bad Gateway".to_vec(),
        };
        assert_eq!(text.value(), json!("Bad Gateway"));
    }
}
