use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use super::Pipeline;

/// Background loop driving the two stages forever.
///
/// Exactly one scheduler instance must run per task store; a second
/// instance would race submissions for the same PENDING rows. Scaling out
/// needs external leader election or key partitioning.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    error_backoff: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            interval: Duration::from_secs(15),
            error_backoff: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run until `shutdown` fires (or its sender drops). Cancellation is
    /// observed at the sleep boundary; an in-flight tick finishes its
    /// network calls naturally.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Background scheduler started.");
        loop {
            let pause = match self.tick().await {
                Ok(()) => self.interval,
                Err(e) => {
                    error!("Critical error in scheduler tick: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.changed() => {
                    info!("Scheduler shutting down.");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let submitted = self.pipeline.submit_pending().await?;
        let settled = self.pipeline.poll_inflight().await?;
        if submitted > 0 || settled > 0 {
            info!("Tick: {} submitted, {} settled", submitted, settled);
        }
        Ok(())
    }
}
