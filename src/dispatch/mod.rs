//! Outbound control signals for dispatched plans.
//!
//! The lifecycle hands every allocation of a dispatched plan to [`deliver`],
//! which wraps a [`SignalDispatcher`] in a bounded retry loop with a
//! per-attempt timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;

/// One cohort's share of a dispatched plan, as sent to the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub plan_id: Uuid,
    pub cohort_id: String,
    pub target_mw: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAck {
    pub reference: String,
    pub acked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Signal rejected: {0}")]
    Rejected(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Attempt timed out after {0} ms")]
    Timeout(u64),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalDispatcher: Send + Sync {
    async fn send_signal(&self, request: &SignalRequest) -> Result<SignalAck, DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &DispatchConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            attempt_timeout: Duration::from_millis(cfg.attempt_timeout_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based): doubles each time.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub attempts: u32,
    pub result: Result<SignalAck, DispatchError>,
}

/// Send one signal, retrying failures and timeouts up to the policy's limit.
pub async fn deliver(
    dispatcher: &dyn SignalDispatcher,
    request: &SignalRequest,
    policy: &RetryPolicy,
) -> DeliveryOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = DispatchError::Transport("no attempt made".to_string());

    for attempt in 1..=max_attempts {
        let result = match timeout(policy.attempt_timeout, dispatcher.send_signal(request)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(policy.attempt_timeout.as_millis() as u64)),
        };

        match result {
            Ok(ack) => {
                if attempt > 1 {
                    debug!(plan_id = %request.plan_id, cohort_id = %request.cohort_id, attempt, "signal delivered after retry");
                }
                return DeliveryOutcome {
                    attempts: attempt,
                    result: Ok(ack),
                };
            }
            Err(e) => {
                warn!(
                    plan_id = %request.plan_id,
                    cohort_id = %request.cohort_id,
                    attempt,
                    error = %e,
                    "signal attempt failed"
                );
                last_error = e;
            }
        }

        if attempt < max_attempts {
            sleep(policy.backoff_after(attempt)).await;
        }
    }

    DeliveryOutcome {
        attempts: max_attempts,
        result: Err(last_error),
    }
}

/// Acknowledges every signal after logging it. Stands in for a real
/// OpenADR-style endpoint.
#[derive(Debug, Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl SignalDispatcher for LoggingDispatcher {
    async fn send_signal(&self, request: &SignalRequest) -> Result<SignalAck, DispatchError> {
        info!(
            plan_id = %request.plan_id,
            cohort_id = %request.cohort_id,
            target_mw = request.target_mw,
            window_start = %request.window_start,
            "dispatching DR signal"
        );
        Ok(SignalAck {
            reference: format!("{}:{}", request.plan_id, request.cohort_id),
            acked_at: Utc::now(),
        })
    }
}

/// Fails a seeded fraction of attempts with a transport error.
pub struct SimulatedDispatcher {
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedDispatcher {
    pub fn new(failure_rate: f64, seed: u64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl SignalDispatcher for SimulatedDispatcher {
    async fn send_signal(&self, request: &SignalRequest) -> Result<SignalAck, DispatchError> {
        let roll: f64 = self.rng.lock().gen();
        if roll < self.failure_rate {
            return Err(DispatchError::Transport(format!(
                "simulated delivery failure for cohort {}",
                request.cohort_id
            )));
        }
        LoggingDispatcher.send_signal(request).await
    }
}
