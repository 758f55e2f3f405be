//! Per-user rate limiting for the sync endpoints.
//!
//! Fixed one-minute windows keyed by endpoint and user.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::AppError;

/// Endpoints that are rate limited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEndpoint {
    Upload,
    Download,
}

impl SyncEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

/// Counts requests per endpoint and user within a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(SyncEndpoint, String), RateWindow>,
    window: Duration,
    limit: u32,
}

impl RateLimiter {
    /// Allow `limit` requests per user per minute on each endpoint.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            limit,
        }
    }

    /// Forget windows that have run out. Returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request, failing once the user has used up the window.
    pub fn check(&self, endpoint: SyncEndpoint, user_id: &str) -> Result<(), AppError> {
        self.check_at(endpoint, user_id, Instant::now())
    }

    fn check_at(
        &self,
        endpoint: SyncEndpoint,
        user_id: &str,
        now: Instant,
    ) -> Result<(), AppError> {
        let mut entry = self
            .windows
            .entry((endpoint, user_id.to_string()))
            .or_insert(RateWindow {
                started_at: now,
                count: 0,
            });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            tracing::warn!(
                endpoint = endpoint.label(),
                user_id,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::TooManyRequests(retry_after_secs));
        }

        entry.count += 1;
        Ok(())
    }
}
