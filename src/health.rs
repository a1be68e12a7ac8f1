//! HTTP health prober with a tri-state result.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_EXPECTED_STATUS, DEFAULT_HEALTH_TIMEOUT};

/// Errors surfaced by the health prober itself (not health failures, which
/// are represented as [`HealthStatus::Red`]).
#[derive(Debug, Error)]
pub enum HealthError {
    /// The health-check URL could not be parsed.
    #[error("invalid health check URL '{url}': {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Underlying parse error.
        #[source]
        source: reqwest::Error,
    },
}

/// Tri-state health result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The endpoint responded with the expected status within budget.
    Green,
    /// The endpoint responded, but with an unexpected status or a degraded body.
    Yellow,
    /// The endpoint did not respond at all (connection refused, timeout, DNS failure).
    Red,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        })
    }
}

/// Blocking HTTP health prober for a single service endpoint.
pub struct HealthProber {
    client: reqwest::blocking::Client,
    url: String,
    expected_status: u16,
}

impl HealthProber {
    /// Builds a prober for `url` using the default timeout and expected status.
    pub fn new(url: impl Into<String>) -> Result<Self, HealthError> {
        Self::with_timeout(url, DEFAULT_HEALTH_TIMEOUT, DEFAULT_EXPECTED_STATUS)
    }

    /// Builds a prober with an explicit timeout and expected status code.
    pub fn with_timeout(
        url: impl Into<String>,
        timeout: Duration,
        expected_status: u16,
    ) -> Result<Self, HealthError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| HealthError::InvalidUrl {
                url: url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            url,
            expected_status,
        })
    }

    /// Performs a single health check, never returning `Err` for a failed
    /// probe: connection failures map to [`HealthStatus::Red`].
    pub fn check(&self) -> HealthStatus {
        match self.client.get(&self.url).send() {
            Ok(response) if response.status().as_u16() == self.expected_status => {
                debug!("health check green: {}", self.url);
                HealthStatus::Green
            }
            Ok(response) => {
                warn!(
                    "health check yellow: {} returned {}",
                    self.url,
                    response.status()
                );
                HealthStatus::Yellow
            }
            Err(err) => {
                warn!("health check red: {}: {err}", self.url);
                HealthStatus::Red
            }
        }
    }

    /// Retries [`check`](Self::check) up to `max_attempts` times, sleeping
    /// `delay` between attempts, returning on the first non-`Red` result.
    pub fn check_with_retries(&self, max_attempts: u32, delay: Duration) -> HealthStatus {
        let mut last = HealthStatus::Red;
        for attempt in 1..=max_attempts.max(1) {
            let started = Instant::now();
            last = self.check();
            if last != HealthStatus::Red {
                return last;
            }
            debug!(
                "health check attempt {attempt}/{max_attempts} red after {:?}",
                started.elapsed()
            );
            if attempt < max_attempts {
                std::thread::sleep(delay);
            }
        }
        last
    }
}
