//! Blocking wait-for-state with exponential backoff, deadline and cancellation

use crate::error::{CloudError, Result};
use crate::model::InstanceState;
use crate::provider::ComputeProvider;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polling configuration for [`wait_for_instance_state`]
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Delay before the second poll
    pub initial_delay: Duration,

    /// Cap on the delay between polls
    pub max_delay: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Give up after this long
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
            timeout: Duration::from_secs(600),
        }
    }
}

impl WaitConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay after the `attempt`-th poll (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// States from which `target` can no longer be reached
fn is_dead_end(state: &InstanceState, target: &InstanceState) -> bool {
    use InstanceState::*;
    match target {
        Stopped => matches!(state, Pending | Terminated | Terminating),
        Running => matches!(state, Stopping | ShuttingDown | Terminated | Terminating),
        _ => matches!(state, Terminated),
    }
}

/// Poll the provider until `instance_id` reports `target`.
///
/// The cancellation token is checked on every iteration and while sleeping.
/// Fails with `Timeout` once `config.timeout` has elapsed, with `Cancelled`
/// when the token fires, and with `UnexpectedState` when the instance
/// enters a state from which `target` is unreachable. Provider errors from
/// the poll itself are returned as-is; nothing is retried.
pub async fn wait_for_instance_state(
    provider: &dyn ComputeProvider,
    instance_id: &str,
    target: InstanceState,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = Instant::now() + config.timeout;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(CloudError::Cancelled(format!(
                "wait for {} to be {}",
                instance_id, target
            )));
        }

        let state = provider.instance_state(instance_id).await?;
        if state == target {
            debug!(
                instance_id = %instance_id,
                state = %state,
                attempts = attempt + 1,
                "Instance reached state"
            );
            return Ok(());
        }
        if is_dead_end(&state, &target) {
            return Err(CloudError::UnexpectedState {
                resource_id: instance_id.to_string(),
                state: state.to_string(),
                expected: target.to_string(),
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CloudError::Timeout(format!(
                "{} still '{}' after {}s waiting for '{}'",
                instance_id,
                state,
                config.timeout.as_secs(),
                target
            )));
        }

        let delay = config.delay_for_attempt(attempt).min(deadline - now);
        debug!(
            instance_id = %instance_id,
            state = %state,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Instance not ready, polling again"
        );
        attempt += 1;

        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(CloudError::Cancelled(format!(
                    "wait for {} to be {}",
                    instance_id, target
                )));
            }
        }
    }
}
