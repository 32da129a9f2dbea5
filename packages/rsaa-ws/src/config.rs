use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Deadline for the transport call, in milliseconds.
pub const CALL_TIMEOUT_ENV: &str = "RSAA_CALL_TIMEOUT_MS";

/// Base URL that relative endpoints are joined onto by `HttpTransport`.
pub const BASE_URL_ENV: &str = "RSAA_BASE_URL";

/// Middleware configuration loaded from environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddlewareConfig {
    pub call_timeout: Option<Duration>,
    pub base_url: Option<String>,
}

impl MiddlewareConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let call_timeout = lookup(CALL_TIMEOUT_ENV)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| {
                        format!("{} must be a number of milliseconds", CALL_TIMEOUT_ENV)
                    })
            })
            .transpose()?;

        let base_url = lookup(BASE_URL_ENV).filter(|url| !url.trim().is_empty());

        Ok(Self {
            call_timeout,
            base_url,
        })
    }
}
