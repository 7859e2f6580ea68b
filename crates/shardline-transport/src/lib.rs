//! Shardline Transport - the rate-limited REST client.
//!
//! Requests are described by a [`Route`], whose rate-limit bucket is derived
//! from the method, the path template and the major parameters. Before
//! sending, the [`RestClient`] takes a [`BucketLease`] in the shared store so
//! that every worker replica observes the same limits, and honours the
//! cluster-wide [`GlobalLease`].
//!
//! # Transports
//!
//! The client talks to an [`HttpTransport`]. Enable the `http-client`
//! feature for the `reqwest`-backed [`ReqwestTransport`].
//!
//! The `amqp-broker` feature adds `AmqpBroker`, a RabbitMQ implementation
//! of the core `Broker` interface.
//!
//! ```rust,ignore
//! use shardline_transport::{Method, RestClient, RestConfig, Route};
//!
//! let client = RestClient::new(transport, store, RestConfig {
//!     token: token.into(),
//!     ..Default::default()
//! });
//! let route = Route::new(Method::Get, "/channels/{channel_id}").param("channel_id", 42);
//! let channel = client.request(&route, None, None).await?;
//! ```

#[cfg(feature = "amqp-broker")]
pub mod amqp;
pub mod error;
pub mod http;
pub mod model;
pub mod ratelimit;
pub mod rest;
pub mod route;

#[cfg(feature = "amqp-broker")]
pub use amqp::AmqpBroker;
pub use error::{HttpError, HttpResult};
#[cfg(feature = "http-client")]
pub use http::ReqwestTransport;
pub use http::{HttpRequest, HttpResponse, HttpTransport, RateLimitHeaders};
pub use model::{ApplicationInfo, GatewayBot, TeamInfo, TeamMember};
pub use ratelimit::{BucketLease, DEFAULT_LEASE_TTL, GLOBAL_LEASE_KEY, GlobalLease};
pub use rest::{RestClient, RestConfig};
pub use route::{Method, Route};
