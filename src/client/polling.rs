use anyhow::Result;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{is_transport_error, ApiClient};
use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::StateItem;

pub const DEFAULT_POLLING_TIMEOUT: Duration = Duration::from_secs(120);

/// How often each polling loop re-checks the peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollingIntervals {
    pub online: Duration,
    pub heartbeat: Duration,
    pub state: Duration,
    pub deletion: Duration,
}

impl Default for PollingIntervals {
    fn default() -> Self {
        Self {
            online: Duration::from_secs(2),
            heartbeat: Duration::from_secs(2),
            state: Duration::from_secs(5),
            deletion: Duration::from_secs(5),
        }
    }
}

impl PollingIntervals {
    pub fn uniform(interval: Duration) -> Self {
        Self {
            online: interval,
            heartbeat: interval,
            state: interval,
            deletion: interval,
        }
    }
}

enum Probe<T> {
    Done(T),
    Pending(String),
}

enum Polled<T> {
    Done(T),
    Cancelled,
    TimedOut(String),
}

fn timed_out(message: String) -> anyhow::Error {
    OrchestrationError::workload(message, ErrorReason::ApiStatePollingTimeout).into()
}

fn describe(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("status {}", status)
    } else {
        body.to_string()
    }
}

impl ApiClient {
    /// Repeats `probe` until it reports done, the deadline passes or cancellation is requested.
    /// Transport errors count as a pending attempt; any other error ends polling.
    async fn poll_until<T, F, Fut>(
        &self,
        interval: Duration,
        timeout: Duration,
        cancellation: &CancellationToken,
        mut probe: F,
    ) -> Result<Polled<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>>>,
    {
        let deadline = Instant::now() + timeout;
        let mut latest = String::from("none");

        loop {
            if cancellation.is_cancelled() {
                return Ok(Polled::Cancelled);
            }

            match probe().await {
                Ok(Probe::Done(value)) => return Ok(Polled::Done(value)),
                Ok(Probe::Pending(state)) => latest = state,
                Err(e) if is_transport_error(&e) => {
                    log::debug!("Polling {}: transport error ignored: {}", self.base_url(), e);
                }
                Err(e) => {
                    return Err(OrchestrationError::workload(
                        format!("API request to '{}' failed while polling. {}", self.base_url(), e),
                        ErrorReason::ApiRequestFailed,
                    )
                    .into());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Polled::TimedOut(latest));
            }

            tokio::select! {
                _ = cancellation.cancelled() => return Ok(Polled::Cancelled),
                _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            }
        }
    }

    pub async fn poll_for_heartbeat(
        &self,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let polled = self
            .poll_until(self.polling.heartbeat, timeout, cancellation, || async move {
                let response = self.get_heartbeat().await?;
                Ok(if response.is_success() {
                    Probe::Done(())
                } else {
                    Probe::Pending(describe(response.status, &response.body))
                })
            })
            .await?;

        match polled {
            Polled::TimedOut(_) => Err(timed_out(format!(
                "Polling for server heartbeat at '{}' timed out (timeout={:?}).",
                self.base_url(),
                timeout
            ))),
            _ => Ok(()),
        }
    }

    pub async fn poll_for_server_online(
        &self,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let polled = self
            .poll_until(self.polling.online, timeout, cancellation, || async move {
                let response = self.get_server_online_status().await?;
                Ok(if response.is_success() {
                    Probe::Done(())
                } else {
                    Probe::Pending(describe(response.status, &response.body))
                })
            })
            .await?;

        match polled {
            Polled::TimedOut(_) => Err(timed_out(format!(
                "Polling for server online status at '{}' timed out (timeout={:?}).",
                self.base_url(),
                timeout
            ))),
            _ => Ok(()),
        }
    }

    /// Waits until the stored state matches `expected` under `comparer`.
    pub async fn poll_for_expected_state<C>(
        &self,
        state_id: &str,
        expected: &serde_json::Value,
        comparer: C,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<()>
    where
        C: Fn(&serde_json::Value, &serde_json::Value) -> bool,
    {
        let comparer = &comparer;
        let polled = self
            .poll_until(self.polling.state, timeout, cancellation, || async move {
                let response = self.get_state(state_id).await?;
                if !response.is_success() {
                    return Ok(Probe::Pending(describe(response.status, &response.body)));
                }

                let state: StateItem = response.json()?;
                Ok(if comparer(&state.definition, expected) {
                    Probe::Done(())
                } else {
                    Probe::Pending(response.body)
                })
            })
            .await?;

        match polled {
            Polled::TimedOut(latest) => Err(timed_out(format!(
                "Polling for expected state '{}' timed out (timeout={:?}). Latest response state: {}",
                state_id, timeout, latest
            ))),
            _ => Ok(()),
        }
    }

    /// Waits until the typed state satisfies `predicate`. `None` when cancelled first.
    pub async fn poll_for_expected_state_typed<T, P>(
        &self,
        state_id: &str,
        predicate: P,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        let predicate = &predicate;
        let polled = self
            .poll_until(self.polling.state, timeout, cancellation, || async move {
                let response = self.get_state(state_id).await?;
                if !response.is_success() {
                    return Ok(Probe::Pending(describe(response.status, &response.body)));
                }

                let state: StateItem<T> = response.json()?;
                Ok(if predicate(&state.definition) {
                    Probe::Done(state.definition)
                } else {
                    Probe::Pending(response.body)
                })
            })
            .await?;

        match polled {
            Polled::Done(state) => Ok(Some(state)),
            Polled::Cancelled => Ok(None),
            Polled::TimedOut(latest) => Err(timed_out(format!(
                "Polling for expected state '{}' timed out (timeout={:?}). Latest response state: {}",
                state_id, timeout, latest
            ))),
        }
    }

    /// Waits until reading the state no longer returns 200.
    pub async fn poll_until_deleted(
        &self,
        state_id: &str,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let polled = self
            .poll_until(self.polling.deletion, timeout, cancellation, || async move {
                let response = self.get_state(state_id).await?;
                Ok(if response.status == 200 {
                    Probe::Pending(response.body)
                } else {
                    Probe::Done(())
                })
            })
            .await?;

        match polled {
            Polled::TimedOut(latest) => Err(timed_out(format!(
                "Polling for deletion of state '{}' timed out (timeout={:?}). Latest response state: {}",
                state_id, timeout, latest
            ))),
            _ => Ok(()),
        }
    }

    /// Computes the desired state and waits for the peer to reach it. `timeout` defaults to
    /// two minutes.
    pub async fn synchronize_state<T>(
        &self,
        state_id: &str,
        desired: impl FnOnce() -> T,
        timeout: Option<Duration>,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + PartialEq,
    {
        let expected = desired();
        self.poll_for_expected_state_typed(
            state_id,
            |state: &T| *state == expected,
            timeout.unwrap_or(DEFAULT_POLLING_TIMEOUT),
            cancellation,
        )
        .await
    }
}
