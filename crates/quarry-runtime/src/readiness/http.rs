//! Readiness by polling the daemon's local HTTP health endpoint.

use std::time::Duration;

use async_trait::async_trait;
use quarry_core::ReadinessOutcome;
use reqwest::{Client, StatusCode};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ProbeContext, ReadinessProbe};

/// Per-request timeout for a single health check.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Attempts after which 403/404 answers are blamed on another service.
const WRONG_SERVICE_ATTEMPTS: u32 = 3;

fn health_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build health check client, requests have no timeout");
            Client::new()
        })
}

/// Polls `http://127.0.0.1:{port}{path}` until it answers 2xx.
#[derive(Debug, Clone)]
pub struct HttpReadinessProbe {
    client: Client,
    path: String,
    poll_interval: Duration,
}

impl HttpReadinessProbe {
    pub fn new(path: impl Into<String>, poll_interval: Duration) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            client: build_client(),
            path,
            poll_interval,
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn await_ready(&self, ctx: ProbeContext, cancel: CancellationToken) -> ReadinessOutcome {
        let url = health_url(ctx.port, &self.path);
        info!(pid = ctx.pid, %url, "Waiting for daemon to be ready");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(pid = ctx.pid, attempt, "Readiness polling cancelled");
                    return ReadinessOutcome::Cancelled;
                }
                _ = ticker.tick() => {}
            }
            attempt += 1;

            let response = tokio::select! {
                () = cancel.cancelled() => return ReadinessOutcome::Cancelled,
                response = self.client.get(&url).send() => response,
            };

            match response {
                Ok(response) if response.status().is_success() => {
                    info!(pid = ctx.pid, port = ctx.port, attempt, "Daemon is ready");
                    return ReadinessOutcome::Ready;
                }
                Ok(response) => {
                    let status = response.status();
                    debug!(%status, attempt, "Health check returned non-success status, retrying");

                    // Fail faster if clearly the wrong service
                    if (status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND)
                        && attempt > WRONG_SERVICE_ATTEMPTS
                    {
                        return ReadinessOutcome::Failed(format!(
                            "port {} appears to be in use by another service (status {status})",
                            ctx.port
                        ));
                    }
                }
                Err(e) => {
                    debug!(error = %e, attempt, "Health check failed, retrying");
                }
            }
        }
    }
}
