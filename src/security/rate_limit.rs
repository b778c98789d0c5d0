//! Fixed-window rate limiting per traffic class.
//!
//! Each [`RateLimiter`] owns a sharded map of window entries. The increment
//! for a key happens under that key's entry lock, so concurrent requests for
//! the same caller never lose an update.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;

use crate::clock::{millis_to_secs_ceil, now_millis};
use crate::config::{KeyStrategy, RateLimitConfig, RateLimitProfile, TrafficClass};
use crate::observability::metrics;

/// One caller's counter for the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub key: String,
    pub count: u32,
    /// Window end, ms since epoch.
    pub window_reset_at: u64,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end, ms since epoch.
    pub reset_at: u64,
    pub total_hits: u32,
}

impl RateLimitDecision {
    /// Attach `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from(millis_to_secs_ceil(self.reset_at)),
        );
    }
}

/// A fixed-window counter for one traffic class.
#[derive(Debug)]
pub struct RateLimiter {
    class: TrafficClass,
    window_ms: u64,
    max_requests: u32,
    key_strategy: KeyStrategy,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(class: TrafficClass, profile: &RateLimitProfile) -> Self {
        Self {
            class,
            window_ms: profile.window_ms,
            max_requests: profile.max_requests,
            key_strategy: profile.key,
            entries: DashMap::new(),
        }
    }

    pub fn class(&self) -> TrafficClass {
        self.class
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, now_millis())
    }

    /// Count one hit for `key` at time `now` (ms since epoch).
    pub fn check_at(&self, key: &str, now: u64) -> RateLimitDecision {
        let (count, reset_at) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now >= entry.window_reset_at {
                    *entry = self.fresh_entry(key, now);
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                (entry.count, entry.window_reset_at)
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(self.fresh_entry(key, now));
                (entry.count, entry.window_reset_at)
            }
        };

        RateLimitDecision {
            allowed: count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_at,
            total_hits: count,
        }
    }

    fn fresh_entry(&self, key: &str, now: u64) -> RateLimitEntry {
        RateLimitEntry {
            key: key.to_string(),
            count: 1,
            window_reset_at: now.saturating_add(self.window_ms),
        }
    }

    /// Derive the bucket key for a caller.
    pub fn key_for(&self, client_ip: IpAddr, user_agent: Option<&str>) -> String {
        match self.key_strategy {
            KeyStrategy::Fingerprint => {
                format!("{}:{}:{}", self.class.as_str(), client_ip, user_agent.unwrap_or("-"))
            }
            KeyStrategy::Ip => format!("{}:{}", self.class.as_str(), client_ip),
            KeyStrategy::Fixed => self.class.as_str().to_string(),
        }
    }

    /// Drop every entry whose window has ended. Returns how many were removed.
    pub fn purge_expired_at(&self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The set of limiters, one per traffic class, injected into the router.
#[derive(Debug)]
pub struct RateLimiters {
    enabled: bool,
    limiters: HashMap<TrafficClass, RateLimiter>,
    purge_interval: Duration,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let limiters = TrafficClass::ALL
            .into_iter()
            .map(|class| (class, RateLimiter::new(class, config.profile(class))))
            .collect();

        Self {
            enabled: config.enabled,
            limiters,
            purge_interval: Duration::from_secs(config.purge_interval_secs),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Count a request from this caller against `class`.
    ///
    /// Returns `None` when rate limiting is disabled.
    pub fn check_request(
        &self,
        class: TrafficClass,
        client_ip: IpAddr,
        user_agent: Option<&str>,
    ) -> Option<RateLimitDecision> {
        if !self.enabled {
            return None;
        }
        let limiter = self.limiters.get(&class)?;
        let key = limiter.key_for(client_ip, user_agent);
        let decision = limiter.check(&key);
        if !decision.allowed {
            tracing::warn!(
                class = class.as_str(),
                key = %key,
                hits = decision.total_hits,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(class.as_str());
        }
        Some(decision)
    }

    pub fn purge_expired_at(&self, now: u64) -> usize {
        self.limiters.values().map(|l| l.purge_expired_at(now)).sum()
    }

    /// Sweep expired windows on a fixed interval until shutdown.
    pub async fn run_purge(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.purge_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired_at(now_millis());
                    if removed > 0 {
                        tracing::debug!(removed, "Purged expired rate limit windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit purge task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Best-effort client address: first `x-forwarded-for` hop, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| peer.map(|p| p.ip()))
        .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

pub fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}
