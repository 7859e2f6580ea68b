//! REST routes and rate-limit bucket derivation.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// HTTP method of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A templated API route such as `/channels/{channel_id}/messages`.
///
/// The rate-limit bucket depends on the method, the template and the major
/// parameters (`channel_id`, `guild_id`, `webhook_id`); other parameters
/// share the bucket.
///
/// # Example
///
/// ```rust,ignore
/// let route = Route::new(Method::Post, "/channels/{channel_id}/messages")
///     .param("channel_id", 42);
/// assert_eq!(route.bucket(), "POST:42::/channels/{channel_id}/messages");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: &'static str,
    params: Vec<(&'static str, String)>,
}

impl Route {
    /// Creates a route without parameters.
    pub fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            params: Vec::new(),
        }
    }

    /// Adds a path parameter.
    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// The route method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The path template.
    pub fn path(&self) -> &'static str {
        self.path
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Formats the full URL with percent-encoded parameters.
    pub fn url(&self, base: &str) -> String {
        let mut path = self.path.to_string();
        for (name, value) in &self.params {
            path = path.replace(&format!("{{{name}}}"), &quote(value));
        }
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    /// The rate-limit bucket key.
    pub fn bucket(&self) -> String {
        let channel = self.get("channel_id").unwrap_or_default();
        let guild = self.get("guild_id").unwrap_or_default();
        match self.get("webhook_id") {
            Some(webhook) => format!(
                "{}:{channel}:{guild}:{webhook}:{}",
                self.method, self.path
            ),
            None => format!("{}:{channel}:{guild}:{}", self.method, self.path),
        }
    }
}

/// Everything outside the unreserved set and `/` is encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// As [`PATH_SEGMENT`], but spaces stay readable.
const AUDIT_REASON: &AsciiSet = &PATH_SEGMENT.remove(b' ');

/// Percent-encodes a path parameter.
pub(crate) fn quote(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Percent-encodes an `X-Audit-Log-Reason` header value.
pub(crate) fn quote_reason(reason: &str) -> String {
    utf8_percent_encode(reason, AUDIT_REASON).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_formatting() {
        let route = Route::new(
            Method::Put,
            "/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me",
        )
        .param("channel_id", 1)
        .param("message_id", 2)
        .param("emoji", "👍");
        assert_eq!(
            route.url("https://api.example/v7/"),
            "https://api.example/v7/channels/1/messages/2/reactions/%F0%9F%91%8D/@me"
        );
    }

    #[test]
    fn test_quote_keeps_unreserved_and_slash() {
        assert_eq!(quote("a-b.c_d~e/f"), "a-b.c_d~e/f");
        assert_eq!(quote("a b?c=d&e"), "a%20b%3Fc%3Dd%26e");
        assert_eq!(quote_reason("spam bot / raid"), "spam bot / raid");
        assert_eq!(quote_reason("50% off"), "50%25 off");
    }

    #[test]
    fn test_bucket_major_parameters() {
        let a = Route::new(Method::Get, "/channels/{channel_id}/messages/{message_id}")
            .param("channel_id", 1)
            .param("message_id", 10);
        let b = Route::new(Method::Get, "/channels/{channel_id}/messages/{message_id}")
            .param("channel_id", 1)
            .param("message_id", 11);
        let c = Route::new(Method::Get, "/channels/{channel_id}/messages/{message_id}")
            .param("channel_id", 2)
            .param("message_id", 10);
        assert_eq!(a.bucket(), b.bucket());
        assert_ne!(a.bucket(), c.bucket());
        assert_eq!(a.bucket(), "GET:1::/channels/{channel_id}/messages/{message_id}");

        let hook = Route::new(Method::Post, "/webhooks/{webhook_id}/{token}")
            .param("webhook_id", 5)
            .param("token", "t");
        assert_eq!(hook.bucket(), "POST:::5:/webhooks/{webhook_id}/{token}");
    }
}
