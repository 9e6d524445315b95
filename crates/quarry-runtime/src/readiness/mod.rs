//! Readiness detection for a freshly launched daemon.
//!
//! A probe answers one question per launch: did the daemon become
//! servable, report a failure, or neither? Probes are cancellable and the
//! supervisor bounds every wait with [`await_ready_within`].

mod http;
mod sentinel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_core::{ReadinessOutcome, ReadinessSettings, SettingsError, SupervisorSettings};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::process::OutputLine;

pub use http::HttpReadinessProbe;
pub use sentinel::SentinelReadinessProbe;

/// What a probe gets to look at for one launch.
#[derive(Debug)]
pub struct ProbeContext {
    /// PID of the launched daemon.
    pub pid: u32,
    /// Port the daemon was told to listen on.
    pub port: u16,
    /// The daemon's output, starting from launch.
    pub output: broadcast::Receiver<OutputLine>,
}

/// Decides when a launched daemon has become servable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Wait until the daemon is ready or has failed.
    ///
    /// Must return `ReadinessOutcome::Cancelled` promptly once `cancel`
    /// fires. Need not enforce a deadline; the caller does.
    async fn await_ready(&self, ctx: ProbeContext, cancel: CancellationToken)
    -> ReadinessOutcome;
}

/// Run `probe` with an upper bound of `timeout`.
///
/// On timeout the probe is cancelled and `ReadinessOutcome::TimedOut` is
/// returned instead of waiting forever. A probe that reports `Cancelled`
/// while `cancel` never fired has given up on its own; that is a failure.
pub async fn await_ready_within(
    probe: &dyn ReadinessProbe,
    ctx: ProbeContext,
    cancel: CancellationToken,
    timeout: Duration,
) -> ReadinessOutcome {
    match tokio::time::timeout(timeout, probe.await_ready(ctx, cancel.clone())).await {
        Ok(ReadinessOutcome::Cancelled) if !cancel.is_cancelled() => {
            warn!("Readiness probe stopped without being cancelled");
            ReadinessOutcome::Failed("readiness probe stopped without a result".to_string())
        }
        Ok(outcome) => outcome,
        Err(_) => {
            cancel.cancel();
            ReadinessOutcome::TimedOut
        }
    }
}

/// Build the probe described by `settings`.
pub fn probe_from_settings(
    settings: &SupervisorSettings,
) -> Result<Arc<dyn ReadinessProbe>, SettingsError> {
    match &settings.readiness {
        ReadinessSettings::Http {
            path,
            poll_interval_ms,
        } => Ok(Arc::new(HttpReadinessProbe::new(
            path.clone(),
            Duration::from_millis(*poll_interval_ms),
        ))),
        ReadinessSettings::Sentinel {
            ready_pattern,
            failure_pattern,
        } => {
            let probe = SentinelReadinessProbe::new(ready_pattern, failure_pattern.as_deref())
                .map_err(|e| SettingsError::InvalidPattern {
                    pattern: ready_pattern.clone(),
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(probe))
        }
    }
}
