//! Temporary blacklisting of callers that keep failing.
//!
//! Each failed invocation bumps `errors:{author}` with a short random TTL.
//! Once the count passes the threshold, the guild (or the author in direct
//! messages) is blacklisted for one to three hours and further commands
//! from it are dropped without a reply.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use shardline_core::{MessageInfo, StoreRef, StoreResult};

pub const DEFAULT_THRESHOLD: u64 = 10;

/// Lifetime of the error counter, in seconds.
pub const DEFAULT_WINDOW: RangeInclusive<u64> = 5..=15;

/// Lifetime of a blacklist entry, in seconds.
pub const DEFAULT_BLACKLIST: RangeInclusive<u64> = 3600..=10800;

/// What [`AbuseGuard::record_failure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The failure was counted; the caller is below the threshold.
    Counted(u64),
    /// The caller went over the threshold and is now blacklisted.
    Blacklisted,
}

/// Counts failures per author and blacklists abusive scopes.
#[derive(Clone)]
pub struct AbuseGuard {
    store: StoreRef,
    threshold: u64,
    window: RangeInclusive<u64>,
    blacklist: RangeInclusive<u64>,
}

impl AbuseGuard {
    pub fn new(store: StoreRef) -> Self {
        Self {
            store,
            threshold: DEFAULT_THRESHOLD,
            window: DEFAULT_WINDOW,
            blacklist: DEFAULT_BLACKLIST,
        }
    }

    /// Failures tolerated before blacklisting.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Range of the error counter TTL, in seconds.
    pub fn with_window(mut self, window: RangeInclusive<u64>) -> Self {
        self.window = window;
        self
    }

    /// Range of the blacklist TTL, in seconds.
    pub fn with_blacklist(mut self, blacklist: RangeInclusive<u64>) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// `blacklist:{guild}`, or `blacklist:{author}` outside guilds.
    pub fn blacklist_key(message: &MessageInfo) -> String {
        format!(
            "blacklist:{}",
            message.guild_id.unwrap_or(message.author.id)
        )
    }

    pub async fn is_blacklisted(&self, message: &MessageInfo) -> StoreResult<bool> {
        self.store.exists(&Self::blacklist_key(message)).await
    }

    /// Records one failure of `message`'s author.
    pub async fn record_failure(&self, message: &MessageInfo) -> StoreResult<Escalation> {
        let errors_key = format!("errors:{}", message.author.id);
        let count = self.store.get_counter(&errors_key).await?;

        if count > self.threshold {
            let key = Self::blacklist_key(message);
            let ttl = random_secs(&self.blacklist);
            self.store.set_ex(&key, "1", ttl).await?;
            warn!(
                key = %key,
                author = message.author.id,
                ttl_secs = ttl.as_secs(),
                "Temporarily blacklisted after repeated command errors"
            );
            return Ok(Escalation::Blacklisted);
        }

        self.store
            .set_ex(
                &errors_key,
                &(count + 1).to_string(),
                random_secs(&self.window),
            )
            .await?;
        Ok(Escalation::Counted(count + 1))
    }
}

fn random_secs(range: &RangeInclusive<u64>) -> Duration {
    let (low, high) = (*range.start(), *range.end());
    if low >= high {
        return Duration::from_secs(low);
    }
    Duration::from_secs(rand::thread_rng().gen_range(low..=high))
}
