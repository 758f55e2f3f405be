//! Engine configuration.

use crate::{error::Result, migrate::DEFAULT_PLACEHOLDER_IDENTITY, Error};
use std::env;
use std::time::Duration;

/// Default bound on a single upload or download.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for [`SyncEngine`](crate::SyncEngine) and [`HttpRemote`](crate::HttpRemote).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the remote, e.g. `https://api.example.com`
    pub api_url: Option<String>,
    /// Owner tag used for records created while signed out
    pub placeholder_identity: String,
    /// Upper bound on one remote call
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            placeholder_identity: DEFAULT_PLACEHOLDER_IDENTITY.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DAYBOOK_API_URL`
    /// - `DAYBOOK_PLACEHOLDER_IDENTITY` (default `local-user`)
    /// - `DAYBOOK_SYNC_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_url = env::var("DAYBOOK_API_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let placeholder_identity = env::var("DAYBOOK_PLACEHOLDER_IDENTITY")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(defaults.placeholder_identity);

        let request_timeout = match env::var("DAYBOOK_SYNC_TIMEOUT_SECS") {
            Ok(raw) => parse_timeout(&raw)?,
            Err(_) => defaults.request_timeout,
        };

        Ok(Self {
            api_url,
            placeholder_identity,
            request_timeout,
        })
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_placeholder_identity(mut self, identity: impl Into<String>) -> Self {
        self.placeholder_identity = identity.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "DAYBOOK_SYNC_TIMEOUT_SECS must be a number, got '{raw}'"
        ))
    })?;
    if secs == 0 {
        return Err(Error::Config(
            "DAYBOOK_SYNC_TIMEOUT_SECS must be greater than zero".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
