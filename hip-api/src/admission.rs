//! Admission Gate
//!
//! Two independent per-tenant counters decide whether a request may proceed:
//!
//! 1. a fixed window (`hip:rate_limit:{id}`) that resets at the window
//!    boundary, and
//! 2. a burst limiter (`hip:burst:{id}`) with a short window whose first
//!    breach extends the key's TTL to a longer cool-down.
//!
//! Both stages are single atomic counter calls ([`CounterStore::incr_with_expiry`]
//! and [`CounterStore::incr_with_breach`]), so concurrent requests from one
//! tenant never race a read-compare-write and a breach cannot lose its
//! cool-down. Every store call carries
//! a deadline, and a counter-store failure denies the request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hip_core::{ProviderId, StoreError};
use hip_storage::{CounterKey, CounterKind, CounterSnapshot, CounterStore};
use thiserror::Error;

use crate::config::env_parse;
use crate::constants::{
    DEFAULT_BURST_LIMIT, DEFAULT_BURST_WINDOW_SECS, DEFAULT_FIXED_WINDOW_LIMIT,
    DEFAULT_FIXED_WINDOW_SECS, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_SUSPENSION_SECS,
};
use crate::telemetry::metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Admission thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Requests admitted per tenant per fixed window.
    pub fixed_window_limit: u64,
    pub fixed_window: Duration,
    /// Requests admitted per tenant per burst window.
    pub burst_limit: u64,
    pub burst_window: Duration,
    /// Cool-down applied to the burst counter once its ceiling is breached.
    pub suspension: Duration,
    /// Deadline for each counter-store call.
    pub store_timeout: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            fixed_window_limit: DEFAULT_FIXED_WINDOW_LIMIT,
            fixed_window: Duration::from_secs(DEFAULT_FIXED_WINDOW_SECS),
            burst_limit: DEFAULT_BURST_LIMIT,
            burst_window: Duration::from_secs(DEFAULT_BURST_WINDOW_SECS),
            suspension: Duration::from_secs(DEFAULT_SUSPENSION_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl AdmissionConfig {
    /// Load thresholds from environment variables.
    ///
    /// - `HIP_FIXED_WINDOW_LIMIT` (default: 100)
    /// - `HIP_FIXED_WINDOW_SECS` (default: 60)
    /// - `HIP_BURST_LIMIT` (default: 20)
    /// - `HIP_BURST_WINDOW_SECS` (default: 1)
    /// - `HIP_SUSPENSION_SECS` (default: 300)
    /// - `HIP_STORE_TIMEOUT_MS` (default: 2000)
    pub fn from_env() -> Self {
        Self {
            fixed_window_limit: env_parse("HIP_FIXED_WINDOW_LIMIT", DEFAULT_FIXED_WINDOW_LIMIT),
            fixed_window: Duration::from_secs(
                env_parse("HIP_FIXED_WINDOW_SECS", DEFAULT_FIXED_WINDOW_SECS).max(1),
            ),
            burst_limit: env_parse("HIP_BURST_LIMIT", DEFAULT_BURST_LIMIT),
            burst_window: Duration::from_secs(
                env_parse("HIP_BURST_WINDOW_SECS", DEFAULT_BURST_WINDOW_SECS).max(1),
            ),
            suspension: Duration::from_secs(
                env_parse("HIP_SUSPENSION_SECS", DEFAULT_SUSPENSION_SECS).max(1),
            ),
            store_timeout: Duration::from_millis(
                env_parse("HIP_STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS).max(1),
            ),
        }
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    /// The fixed window is full; the next window admits again.
    RetryNextWindow,
    /// The burst ceiling was breached; the tenant is cooling down.
    Suspended,
}

impl DenialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialKind::RetryNextWindow => "retry_next_window",
            DenialKind::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    /// How long the client should wait before retrying.
    pub retry_after: Duration,
}

impl Denial {
    /// Retry hint in whole seconds, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(Denial),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// The counter store could not be consulted; the request is not admitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("admission check for {tenant} failed at {stage:?}: {source}")]
pub struct AdmissionError {
    pub tenant: ProviderId,
    pub stage: CounterKind,
    #[source]
    pub source: StoreError,
}

// ============================================================================
// GATE
// ============================================================================

/// Per-tenant admission gate.
#[derive(Clone)]
pub struct AdmissionGate {
    counters: Arc<dyn CounterStore>,
    config: AdmissionConfig,
}

impl AdmissionGate {
    pub fn new(counters: Arc<dyn CounterStore>, config: AdmissionConfig) -> Self {
        Self { counters, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Run both stages for `tenant`. The burst stage is only consulted when
    /// the fixed window admits.
    pub async fn admit(&self, tenant: &ProviderId) -> Result<Admission, AdmissionError> {
        let result = self.evaluate(tenant).await;

        let outcome = match &result {
            Ok(Admission::Allowed) => "allowed",
            Ok(Admission::Denied(denial)) => denial.kind.as_str(),
            Err(_) => "error",
        };
        if let Some(metrics) = metrics() {
            metrics.record_admission(outcome);
        }

        match &result {
            Ok(Admission::Denied(denial)) => tracing::debug!(
                tenant = %tenant,
                kind = denial.kind.as_str(),
                retry_after_secs = denial.retry_after_secs(),
                "Request denied by admission gate"
            ),
            Err(err) => tracing::error!(
                tenant = %tenant,
                stage = ?err.stage,
                error = %err.source,
                "Admission check failed; denying request"
            ),
            Ok(Admission::Allowed) => {}
        }

        result
    }

    async fn evaluate(&self, tenant: &ProviderId) -> Result<Admission, AdmissionError> {
        let fixed_key = CounterKey::new(CounterKind::FixedWindow, tenant);
        let fixed = self
            .increment(&fixed_key, self.config.fixed_window)
            .await?;
        if fixed.count > self.config.fixed_window_limit {
            return Ok(Admission::Denied(Denial {
                kind: DenialKind::RetryNextWindow,
                retry_after: fixed.ttl.unwrap_or(self.config.fixed_window),
            }));
        }

        let burst_key = CounterKey::new(CounterKind::Burst, tenant);
        let burst = self
            .with_deadline(
                &burst_key,
                "incr_with_breach",
                self.counters.incr_with_breach(
                    &burst_key,
                    self.config.burst_window,
                    self.config.burst_limit,
                    self.config.suspension,
                ),
            )
            .await?;
        if burst.count <= self.config.burst_limit {
            return Ok(Admission::Allowed);
        }

        Ok(Admission::Denied(Denial {
            kind: DenialKind::Suspended,
            retry_after: burst.ttl.unwrap_or(self.config.suspension),
        }))
    }

    async fn increment(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, AdmissionError> {
        self.with_deadline(
            key,
            "incr_with_expiry",
            self.counters.incr_with_expiry(key, window),
        )
        .await
    }

    async fn with_deadline<T>(
        &self,
        key: &CounterKey,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AdmissionError> {
        let source = match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => StoreError::Timeout {
                operation: operation.to_string(),
                millis: u64::try_from(self.config.store_timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };
        Err(AdmissionError {
            tenant: key.tenant().clone(),
            stage: key.kind(),
            source,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
