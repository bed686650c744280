//! The request pipeline
//!
//! [`Client::send`] is the per-call entry point: it builds a transport
//! request from a descriptor, applies the retry policy and the timestamp
//! codec, and layers the refresh coordinator on top so an expired session
//! credential is renewed once and blocked requests are replayed in order.
//!
//! One `Client` per backend target. Cloning is cheap; clones share the
//! transport connection pool, cookie jar, and coordinator state.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use url::Url;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::codec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::refresh::{
    Admission, RefreshCoordinator, RefresherGuard, SessionEvent, UnauthorizedRole,
};
use crate::request::RequestDescriptor;
use crate::retry::{execute_with_retry, RetryPolicy};

/// A decoded HTTP response
///
/// `body` is `None` for empty 2xx responses; otherwise the JSON body with
/// `*At` timestamp fields already coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

/// HTTP client for one Wayfare backend
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
    refresh_url: Url,
    coordinator: Arc<RefreshCoordinator>,
}

impl Client {
    /// Create a client for the given backend configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .cookie_store(config.include_credentials)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let retry =
            RetryPolicy::new(config.retry_limit).with_methods(config.retry_methods.clone());

        let refresh_url = config.refresh_url()?;

        Ok(Self {
            config,
            http,
            retry,
            refresh_url,
            coordinator: Arc::new(RefreshCoordinator::new()),
        })
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to session events (emitted when the session cannot be
    /// restored and the user must re-authenticate)
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    /// Send a request through the full pipeline.
    ///
    /// Returns the decoded response on 2xx. Non-401 error statuses surface
    /// verbatim as [`Error::Status`]. A 401 on a non-refresh path triggers
    /// the refresh coordinator: the request either performs the refresh and
    /// is replayed, or parks until the in-flight refresh settles.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ApiResponse> {
        // Requests to the refresh endpoint are routed outside interception.
        if self.config.is_refresh_path(&descriptor.path) {
            return self.execute(&descriptor).await;
        }

        // Requests arriving mid-refresh park before they are sent.
        if let Admission::Parked(outcome) = self.coordinator.admit(&descriptor) {
            return await_outcome(outcome).await;
        }

        match self.execute(&descriptor).await {
            Err(Error::Status { status, body }) if status == StatusCode::UNAUTHORIZED => {
                match self.coordinator.on_unauthorized(&descriptor) {
                    UnauthorizedRole::Parked(outcome) => await_outcome(outcome).await,
                    UnauthorizedRole::Refresher(guard) => {
                        self.run_refresh_cycle(guard, descriptor, status, body).await
                    }
                }
            }
            outcome => outcome,
        }
    }

    /// Convenience: GET a path
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(RequestDescriptor::get(path).build()).await
    }

    /// Convenience: POST a JSON body to a path
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(RequestDescriptor::post(path).json(body).build()).await
    }

    /// Convenience: PUT a JSON body to a path
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(RequestDescriptor::put(path).json(body).build()).await
    }

    /// Convenience: DELETE a path
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(RequestDescriptor::delete(path).build()).await
    }

    /// Run the retry policy over single attempts. No 401 interception here;
    /// replays go through this layer so a replayed request that fails again
    /// surfaces its outcome as-is instead of recursing.
    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
        execute_with_retry(&descriptor.method, &self.retry, || async {
            self.execute_once(descriptor).await
        })
        .await
    }

    /// One attempt: build, send, decode
    async fn execute_once(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse> {
        let request = descriptor.build_http_request(&self.config, &self.http)?;

        let response = self.http.execute(request).await.map_err(Error::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(Error::from_transport)?;

        if status.is_success() {
            let body = codec::decode_body(&text)?;
            Ok(ApiResponse { status, body })
        } else {
            // Error bodies are surfaced verbatim; a non-JSON body becomes a
            // plain string value rather than a decode failure.
            let body = match codec::decode_body(&text) {
                Ok(body) => body,
                Err(_) => Some(Value::String(text)),
            };
            Err(Error::Status { status, body })
        }
    }

    /// This caller owns the in-flight refresh: call the refresh endpoint,
    /// then either replay (own request first, queue in FIFO order) or
    /// cascade the failure to every waiter. The guard settles the cycle on
    /// every path, including this future being dropped mid-refresh.
    async fn run_refresh_cycle(
        &self,
        guard: RefresherGuard<'_>,
        descriptor: RequestDescriptor,
        original_status: StatusCode,
        original_body: Option<Value>,
    ) -> Result<ApiResponse> {
        match self.call_refresh_endpoint().await {
            Ok(status) if status.is_success() => {
                let queue = guard.settle_success();

                // The refresher's request is logically first in line.
                let own_outcome = self.execute(&descriptor).await;

                for pending in queue {
                    let outcome = self.execute(&pending.descriptor).await;
                    // A dropped receiver means the caller gave up.
                    let _ = pending.reply.send(outcome);
                }

                own_outcome
            }
            Ok(status) => {
                warn!(%status, "refresh endpoint answered with an error");
                let rejected = status == StatusCode::UNAUTHORIZED;
                guard.settle_failure(
                    Some(status.as_u16()),
                    &format!("refresh endpoint answered {status}"),
                    rejected,
                );

                // Not retried: without a valid credential a replay would
                // repeat the same failure.
                Err(Error::Status { status: original_status, body: original_body })
            }
            Err(transport) => {
                warn!("refresh call failed at the transport level: {}", transport);
                guard.settle_failure(None, &transport.to_string(), false);

                Err(Error::Status { status: original_status, body: original_body })
            }
        }
    }

    /// Issue the refresh call directly against the transport, bypassing both
    /// the retry policy and the coordinator's own interception.
    async fn call_refresh_endpoint(&self) -> std::result::Result<StatusCode, reqwest::Error> {
        debug!(url = %self.refresh_url, "calling refresh endpoint");
        let response = self
            .http
            .post(self.refresh_url.clone())
            .timeout(self.config.timeout)
            .send()
            .await?;

        Ok(response.status())
    }
}

async fn await_outcome(
    outcome: tokio::sync::oneshot::Receiver<Result<ApiResponse>>,
) -> Result<ApiResponse> {
    match outcome.await {
        Ok(result) => result,
        Err(_) => Err(Error::Internal {
            message: "refresh coordinator dropped a parked request".to_string(),
        }),
    }
}
