//! Client retry policy for failed request attempts
//!
//! One [`ClientRetryPolicy`] instance is created per logical operation by
//! the request pipeline. The pipeline calls
//! [`on_before_send_request`](ClientRetryPolicy::on_before_send_request)
//! before the first attempt and [`should_retry`](ClientRetryPolicy::should_retry)
//! after each failed one. The policy is purely decisional: it computes the
//! backoff and marks endpoints through the [`EndpointManager`] collaborator,
//! but the waiting itself is the caller's job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;
use crate::request::DocumentRequest;

/// Fixed backoff between network-failure retries
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// First throttle backoff when the service suggests no delay; doubles per
/// attempt up to [`THROTTLE_BACKOFF_CAP`]
const THROTTLE_BACKOFF_BASE: Duration = Duration::from_millis(500);
const THROTTLE_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// A regional service endpoint, as resolved by the endpoint manager
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint(String);

impl ServiceEndpoint {
    /// Wrap an endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The endpoint URL
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Endpoint resolution and availability bookkeeping the retry policy
/// delegates to. Implementations must be thread-safe; one endpoint manager
/// is shared by every in-flight operation of a client.
#[async_trait]
pub trait EndpointManager: Send + Sync {
    /// Endpoint the given request is currently routed to
    fn resolve_service_endpoint(&self, request: &DocumentRequest) -> ServiceEndpoint;

    /// Exclude an endpoint from read routing until the next location refresh
    fn mark_endpoint_unavailable_for_read(&self, endpoint: &ServiceEndpoint);

    /// Exclude an endpoint from write routing until the next location refresh
    fn mark_endpoint_unavailable_for_write(&self, endpoint: &ServiceEndpoint);

    /// Re-fetch the account topology so routing reflects the marks above
    async fn refresh_locations(&self);
}

/// Retry limits for throttled requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Attempt budget for throttled (429) responses
    pub max_retry_attempts_on_throttled_requests: u32,
    /// Cumulative wait budget across throttle retries of one operation
    pub max_retry_wait_time: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts_on_throttled_requests: 9,
            max_retry_wait_time: Duration::from_secs(30),
        }
    }
}

/// Outcome of a [`ClientRetryPolicy::should_retry`] evaluation
#[derive(Debug)]
pub enum RetryDecision {
    /// Retry after waiting `backoff`
    Retry {
        /// How long the caller must wait before the next attempt
        backoff: Duration,
    },
    /// Give up; `source` is the error the caller must surface unchanged
    DontRetry {
        /// The triggering error, handed back to the caller
        source: Error,
    },
}

impl RetryDecision {
    /// Whether another attempt should be made
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    /// Backoff to wait before the next attempt, `None` for terminal decisions
    pub fn backoff(&self) -> Option<Duration> {
        match self {
            Self::Retry { backoff } => Some(*backoff),
            Self::DontRetry { .. } => None,
        }
    }
}

/// Per-operation retry decision procedure
///
/// Not shared across operations; the pipeline constructs a fresh instance
/// for each logical request and discards it afterwards.
pub struct ClientRetryPolicy {
    endpoint_manager: Arc<dyn EndpointManager>,
    use_multiple_write_locations: bool,
    retry_options: RetryOptions,
    /// `None` until `on_before_send_request` ran; decisions without request
    /// context short-circuit to `DontRetry`.
    is_read_request: Option<bool>,
    current_endpoint: Option<ServiceEndpoint>,
    network_failure_count: u32,
    throttle_retry_count: u32,
    cumulative_throttle_wait: Duration,
}

impl ClientRetryPolicy {
    /// Create a policy for one logical operation
    pub fn new(
        endpoint_manager: Arc<dyn EndpointManager>,
        use_multiple_write_locations: bool,
        retry_options: RetryOptions,
    ) -> Self {
        Self {
            endpoint_manager,
            use_multiple_write_locations,
            retry_options,
            is_read_request: None,
            current_endpoint: None,
            network_failure_count: 0,
            throttle_retry_count: 0,
            cumulative_throttle_wait: Duration::ZERO,
        }
    }

    /// Capture the operation context before an attempt is sent. Must run
    /// before the first `should_retry`; resets the network attempt counter.
    pub fn on_before_send_request(&mut self, request: &DocumentRequest) {
        self.is_read_request = Some(!request.operation_type.is_write_operation());
        self.network_failure_count = 0;
        self.current_endpoint = Some(self.endpoint_manager.resolve_service_endpoint(request));
    }

    /// Decide whether the failed attempt should be retried.
    ///
    /// Terminal decisions hand the triggering error back unchanged so the
    /// caller surfaces the original status code.
    pub async fn should_retry(&mut self, error: Error) -> RetryDecision {
        let Some(is_read) = self.is_read_request else {
            // No request context captured: nothing was sent through this
            // policy, so there is no endpoint to mark and no basis to retry.
            return RetryDecision::DontRetry { source: error };
        };

        match &error {
            Error::Transport(_) | Error::RequestTimeout(_) => {
                self.on_network_failure(is_read).await
            }
            Error::Throttled { retry_after, .. } => {
                let retry_after = *retry_after;
                self.on_throttled(retry_after, error)
            }
            // Session and partition-gone failures are retried by the
            // policies layered above this one.
            _ => RetryDecision::DontRetry { source: error },
        }
    }

    async fn on_network_failure(&mut self, is_read: bool) -> RetryDecision {
        if let Some(endpoint) = &self.current_endpoint {
            if is_read {
                self.endpoint_manager
                    .mark_endpoint_unavailable_for_read(endpoint);
            } else {
                self.endpoint_manager
                    .mark_endpoint_unavailable_for_write(endpoint);
            }
        }
        self.endpoint_manager.refresh_locations().await;
        self.network_failure_count += 1;

        // Writes fail fast on the first retry when another write region can
        // take the request; everything else waits the fixed interval.
        let fast_probe =
            !is_read && self.use_multiple_write_locations && self.network_failure_count == 1;
        let backoff = if fast_probe {
            Duration::ZERO
        } else {
            RETRY_INTERVAL
        };
        debug!(
            attempt = self.network_failure_count,
            is_read,
            backoff_ms = backoff.as_millis() as u64,
            "retrying after network failure"
        );
        RetryDecision::Retry { backoff }
    }

    fn on_throttled(&mut self, retry_after: Option<Duration>, error: Error) -> RetryDecision {
        self.throttle_retry_count += 1;
        if self.throttle_retry_count
            > self
                .retry_options
                .max_retry_attempts_on_throttled_requests
        {
            debug!(
                attempts = self.throttle_retry_count,
                "throttle retry budget exhausted"
            );
            return RetryDecision::DontRetry { source: error };
        }

        let backoff = retry_after.unwrap_or_else(|| {
            let doublings = self.throttle_retry_count.saturating_sub(1).min(16);
            let millis = (THROTTLE_BACKOFF_BASE.as_millis() as u64)
                .saturating_mul(1u64 << doublings)
                .min(THROTTLE_BACKOFF_CAP.as_millis() as u64);
            Duration::from_millis(millis)
        });

        if self.cumulative_throttle_wait + backoff > self.retry_options.max_retry_wait_time {
            debug!("throttle wait budget exhausted");
            return RetryDecision::DontRetry { source: error };
        }
        self.cumulative_throttle_wait += backoff;

        debug!(
            attempt = self.throttle_retry_count,
            backoff_ms = backoff.as_millis() as u64,
            "retrying after throttled response"
        );
        RetryDecision::Retry { backoff }
    }
}
