//! Client configuration
//!
//! One `ClientConfig` per backend target. The Wayfare frontend talks to more
//! than one backend, each with its own base address; every config gets its
//! own `Client` and therefore its own refresh coordinator state.

use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::error::{Error, Result};

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of automatic retries after the initial attempt
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default path of the session refresh endpoint
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Configuration for a single backend target
///
/// Immutable once handed to [`Client::new`](crate::Client::new).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address all request paths are resolved against
    pub base_url: Url,
    /// Per-attempt timeout; an attempt exceeding it counts as a transient
    /// failure and is eligible for retry
    pub timeout: Duration,
    /// Maximum number of automatic retries for transient failures
    pub retry_limit: u32,
    /// Methods eligible for transient-failure retry.
    ///
    /// POST is in the default set because the backends treat creation calls
    /// as idempotent; narrow this to read-only methods if yours do not.
    pub retry_methods: Vec<Method>,
    /// Attach session cookies automatically (the transport's cookie jar)
    pub include_credentials: bool,
    /// Path of the refresh endpoint. Requests to this path are never
    /// intercepted by the refresh coordinator.
    pub refresh_path: String,
}

impl ClientConfig {
    /// Create a configuration for the given base address with defaults:
    /// 30 s timeout, 3 retries for GET/POST, credentials included.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {base_url}: {e}"),
        })?;

        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_methods: vec![Method::GET, Method::POST],
            include_credentials: true,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
        })
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry limit
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Replace the set of retry-eligible methods
    pub fn with_retry_methods(mut self, methods: Vec<Method>) -> Self {
        self.retry_methods = methods;
        self
    }

    /// Enable or disable automatic credential forwarding
    pub fn with_credentials(mut self, include: bool) -> Self {
        self.include_credentials = include;
        self
    }

    /// Override the refresh endpoint path
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config { message: "timeout cannot be zero".to_string() });
        }

        if !self.refresh_path.starts_with('/') {
            return Err(Error::Config {
                message: format!("refresh path must be absolute: {}", self.refresh_path),
            });
        }

        Ok(())
    }

    /// Resolve a request path against the base address
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| Error::Request {
            message: format!("failed to join path {path}: {e}"),
            source: None,
        })
    }

    /// Full URL of the refresh endpoint
    pub fn refresh_url(&self) -> Result<Url> {
        self.endpoint_url(&self.refresh_path)
    }

    /// Check whether a request path targets the refresh endpoint
    pub fn is_refresh_path(&self, path: &str) -> bool {
        path == self.refresh_path
    }
}
