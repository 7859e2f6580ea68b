//! Shardline Core - model and service interfaces for the worker runtime.
//!
//! This crate provides:
//! - The broker [`Envelope`] and [`RoutingKey`] model
//! - Interfaces for the external collaborators: [`Broker`], [`SharedStore`],
//!   [`EntityLookup`] and [`Outbound`]
//! - Entity projections and [`Permissions`]
//! - In-memory [`MemoryStore`] and [`MemoryBroker`] implementations
//!
//! Higher layers (`shardline-transport`, `shardline-framework`,
//! `shardline-runtime`) depend only on these traits, so every collaborator
//! can be swapped for a test double.

pub mod broker;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod outbound;
pub mod store;

pub use broker::{Broker, Deliveries, QueueKind, Topology};
pub use entity::{
    ChannelInfo, ChannelKind, EntityLookup, GuildInfo, MemberInfo, MessageInfo, Permissions,
    RoleInfo, UserInfo,
};
pub use envelope::{Envelope, RoutingKey, ShardId};
pub use error::{
    BrokerError, BrokerResult, EnvelopeError, EnvelopeResult, LookupError, LookupResult,
    OutboundError, OutboundResult, StoreError, StoreResult,
};
pub use memory::{MemoryBroker, MemoryStore, topic_matches};
pub use outbound::Outbound;
pub use store::{KeyTtl, SharedStore, StoreRef};
