//! Readiness by watching the daemon's output for a sentinel line.

use async_trait::async_trait;
use quarry_core::ReadinessOutcome;
use regex::Regex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ProbeContext, ReadinessProbe};

/// Ready once an output line matches `ready`; failed once one matches `failure`.
#[derive(Debug, Clone)]
pub struct SentinelReadinessProbe {
    ready: Regex,
    failure: Option<Regex>,
}

impl SentinelReadinessProbe {
    pub fn new(ready_pattern: &str, failure_pattern: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            ready: Regex::new(ready_pattern)?,
            failure: failure_pattern.map(Regex::new).transpose()?,
        })
    }
}

#[async_trait]
impl ReadinessProbe for SentinelReadinessProbe {
    async fn await_ready(
        &self,
        mut ctx: ProbeContext,
        cancel: CancellationToken,
    ) -> ReadinessOutcome {
        debug!(pid = ctx.pid, pattern = %self.ready, "Watching daemon output for readiness");

        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => return ReadinessOutcome::Cancelled,
                received = ctx.output.recv() => received,
            };

            match received {
                Ok(output) => {
                    // Failure wins when a line matches both
                    if self
                        .failure
                        .as_ref()
                        .is_some_and(|failure| failure.is_match(&output.line))
                    {
                        return ReadinessOutcome::Failed(output.line);
                    }
                    if self.ready.is_match(&output.line) {
                        info!(pid = ctx.pid, stream = %output.stream, "Daemon signaled readiness");
                        return ReadinessOutcome::Ready;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(pid = ctx.pid, skipped, "Readiness probe fell behind daemon output");
                }
                Err(RecvError::Closed) => {
                    return ReadinessOutcome::Failed(
                        "daemon closed its output before signaling readiness".to_string(),
                    );
                }
            }
        }
    }
}
