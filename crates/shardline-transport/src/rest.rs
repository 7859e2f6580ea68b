//! The rate-limited REST client.
//!
//! Every call goes through the same pipeline:
//!
//! 1. Wait out the cluster-wide [`GlobalLease`], if one is in effect.
//! 2. Acquire the route's [`BucketLease`].
//! 3. Send, up to `max_attempts` times:
//!    - remaining quota `0` (and not a 429): keep the lease until the reset delay
//!      instead of releasing it;
//!    - 2xx: return the body;
//!    - 429 with a `Via` header: hold the bucket and, for global limits, the
//!      global lease for `retry_after`, sleep, and resend;
//!    - 429 without `Via`: fail immediately;
//!    - 500/502: sleep `1 + 2 * attempt` seconds and resend;
//!    - 403/404/other: fail immediately with the typed error.
//! 4. Release the lease unless step 3 deferred it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use shardline_core::{
    ChannelInfo, GuildInfo, MemberInfo, Outbound, OutboundResult, RoleInfo, StoreRef, UserInfo,
};

use crate::error::{HttpError, HttpResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, RateLimitHeaders};
use crate::model::{ApplicationInfo, GatewayBot};
use crate::ratelimit::{BucketLease, DEFAULT_LEASE_TTL, GlobalLease};
use crate::route::{Method, Route, quote_reason};

/// Settings of a [`RestClient`].
#[derive(Clone)]
pub struct RestConfig {
    /// API base URL, e.g. `https://discord.com/api/v7`.
    pub base_url: String,
    /// Bot token, sent as `Authorization: Bot <token>`.
    pub token: String,
    /// `User-Agent` header.
    pub user_agent: String,
    /// TTL of a freshly acquired bucket lease.
    pub lease_ttl: Duration,
    /// Attempts per request before giving up.
    pub max_attempts: u32,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://discord.com/api/v7".to_string(),
            token: String::new(),
            user_agent: format!("DiscordBot (shardline, {})", env!("CARGO_PKG_VERSION")),
            lease_ttl: DEFAULT_LEASE_TTL,
            max_attempts: 5,
        }
    }
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("lease_ttl", &self.lease_ttl)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    /// Milliseconds to wait.
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// Upstream REST client with distributed rate limiting.
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    store: StoreRef,
    global: GlobalLease,
    config: RestConfig,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Creates a client over `transport`, coordinating leases through `store`.
    pub fn new(transport: Arc<dyn HttpTransport>, store: StoreRef, config: RestConfig) -> Self {
        Self {
            transport,
            global: GlobalLease::new(store.clone()),
            store,
            config,
        }
    }

    /// Returns the client settings.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn build_request(
        &self,
        route: &Route,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> HttpResult<HttpRequest> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("X-RateLimit-Precision".to_string(), "millisecond".to_string()),
            (
                "Authorization".to_string(),
                format!("Bot {}", self.config.token),
            ),
        ];
        let body = match body {
            Some(value) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(serde_json::to_vec(value)?)
            }
            None => None,
        };
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            headers.push((
                "X-Audit-Log-Reason".to_string(),
                quote_reason(reason),
            ));
        }

        Ok(HttpRequest {
            method: route.method(),
            url: route.url(&self.config.base_url),
            headers,
            body,
        })
    }

    /// Sends a request through the rate-limit pipeline and returns the
    /// decoded body.
    pub async fn request(
        &self,
        route: &Route,
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> HttpResult<Value> {
        let request = self.build_request(route, body, reason)?;
        let bucket = route.bucket();

        self.global.wait().await?;

        let lease = BucketLease::new(self.store.clone(), &bucket, self.config.lease_ttl);
        lease.acquire().await?;

        let mut deferred = false;
        let result = self
            .send_with_retries(&request, &bucket, &lease, &mut deferred)
            .await;

        if !deferred && let Err(e) = lease.release().await {
            warn!(bucket = %bucket, error = %e, "Failed to release bucket lease");
        }
        result
    }

    async fn send_with_retries(
        &self,
        request: &HttpRequest,
        bucket: &str,
        lease: &BucketLease,
        deferred: &mut bool,
    ) -> HttpResult<Value> {
        let mut last: Option<(u16, Value)> = None;

        for attempt in 0..self.config.max_attempts {
            let response = self.transport.send(request.clone()).await?;
            let limits = RateLimitHeaders::from_response(&response);
            let data = response.value();
            debug!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                "request returned"
            );

            if limits.is_exhausted() && response.status != 429 {
                let delay = limits.reset_after.unwrap_or(self.config.lease_ttl);
                info!(
                    bucket = %bucket,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limit bucket exhausted"
                );
                *deferred = true;
                lease.release_in(delay).await?;
            }

            if response.is_success() {
                return Ok(data);
            }

            if response.status == 429 {
                if !limits.via {
                    return Err(HttpError::status(429, &data));
                }

                let (retry_after, global) = retry_after(&response, &data, &limits);
                warn!(
                    bucket = %bucket,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limited, retrying"
                );
                lease.release_in(retry_after).await?;
                if global {
                    warn!(
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Global rate limit hit"
                    );
                    self.global.engage(retry_after).await?;
                }
                sleep(retry_after).await;
                last = Some((429, data));
                continue;
            }

            if matches!(response.status, 500 | 502) {
                let delay = Duration::from_secs(1 + u64::from(attempt) * 2);
                warn!(
                    status = response.status,
                    delay_secs = delay.as_secs(),
                    "Server error, retrying"
                );
                sleep(delay).await;
                last = Some((response.status, data));
                continue;
            }

            return Err(HttpError::from_response(response.status, &data));
        }

        Err(match last {
            Some((status, data)) => HttpError::status(status, &data),
            None => HttpError::Transport("no request attempts configured".to_string()),
        })
    }

    /// Sends a request and decodes the body into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        route: &Route,
        body: Option<&Value>,
    ) -> HttpResult<T> {
        let value = self.request(route, body, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Verifies the token by fetching the bot user.
    pub async fn static_login(&self) -> HttpResult<UserInfo> {
        match self
            .request_as(&Route::new(Method::Get, "/users/@me"), None)
            .await
        {
            Err(e) if e.status_code() == Some(401) => Err(HttpError::LoginFailure),
            other => other,
        }
    }

    /// Fetches the gateway URL and recommended shard count.
    pub async fn gateway_bot(&self) -> HttpResult<GatewayBot> {
        self.request_as(&Route::new(Method::Get, "/gateway/bot"), None)
            .await
            .map_err(|e| {
                debug!(error = %e, "gateway lookup failed");
                HttpError::GatewayNotFound
            })
    }

    pub async fn application_info(&self) -> HttpResult<ApplicationInfo> {
        self.request_as(&Route::new(Method::Get, "/oauth2/applications/@me"), None)
            .await
    }

    pub async fn get_user(&self, user_id: u64) -> HttpResult<UserInfo> {
        let route = Route::new(Method::Get, "/users/{user_id}").param("user_id", user_id);
        self.request_as(&route, None).await
    }

    pub async fn get_channel(&self, channel_id: u64) -> HttpResult<ChannelInfo> {
        let route =
            Route::new(Method::Get, "/channels/{channel_id}").param("channel_id", channel_id);
        self.request_as(&route, None).await
    }

    pub async fn get_guild(&self, guild_id: u64) -> HttpResult<GuildInfo> {
        let route = Route::new(Method::Get, "/guilds/{guild_id}").param("guild_id", guild_id);
        self.request_as(&route, None).await
    }

    pub async fn get_guild_roles(&self, guild_id: u64) -> HttpResult<Vec<RoleInfo>> {
        let route =
            Route::new(Method::Get, "/guilds/{guild_id}/roles").param("guild_id", guild_id);
        self.request_as(&route, None).await
    }

    pub async fn get_member(&self, guild_id: u64, user_id: u64) -> HttpResult<MemberInfo> {
        let route = Route::new(Method::Get, "/guilds/{guild_id}/members/{user_id}")
            .param("guild_id", guild_id)
            .param("user_id", user_id);
        self.request_as(&route, None).await
    }

    /// Posts a message and returns the created message object.
    pub async fn create_message(&self, channel_id: u64, content: &str) -> HttpResult<Value> {
        let route = Route::new(Method::Post, "/channels/{channel_id}/messages")
            .param("channel_id", channel_id);
        self.request(&route, Some(&json!({ "content": content })), None)
            .await
    }

    pub async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> HttpResult<()> {
        let route = Route::new(
            Method::Put,
            "/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me",
        )
        .param("channel_id", channel_id)
        .param("message_id", message_id)
        .param("emoji", emoji);
        self.request(&route, None, None).await.map(|_| ())
    }
}

/// Resolves the retry delay and global flag of a 429.
///
/// The body's `retry_after` is in milliseconds; the `Retry-After` header
/// (seconds) is the fallback.
fn retry_after(response: &HttpResponse, data: &Value, limits: &RateLimitHeaders) -> (Duration, bool) {
    match RateLimitedBody::deserialize(data) {
        Ok(body) if body.retry_after.is_finite() && body.retry_after >= 0.0 => (
            Duration::from_secs_f64(body.retry_after / 1000.0),
            body.global || limits.global,
        ),
        _ => {
            let secs = response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(1.0);
            (Duration::from_secs_f64(secs), limits.global)
        }
    }
}

#[async_trait]
impl Outbound for RestClient {
    async fn send_message(&self, channel_id: u64, content: &str) -> OutboundResult<()> {
        self.create_message(channel_id, content).await?;
        Ok(())
    }
}
