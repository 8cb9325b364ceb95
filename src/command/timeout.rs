use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

use super::report::CommandReporter;

/// Periodically expires commands whose acknowledgment never arrived.
/// Runs on its own timer, independent of link traffic.
pub struct AckTimeoutSweeper {
    reporter: Arc<CommandReporter>,
    timeout: Duration,
    period: Duration,
}

impl AckTimeoutSweeper {
    pub fn new(reporter: Arc<CommandReporter>, timeout: Duration, period: Duration) -> Self {
        Self {
            reporter,
            timeout,
            period,
        }
    }

    /// One pass; returns how many commands expired
    pub async fn sweep_once(&self) -> usize {
        let expired = self
            .reporter
            .tracker()
            .sweep(Instant::now(), self.timeout)
            .await;
        let count = expired.len();
        if count > 0 {
            self.reporter.expired(expired, self.timeout);
        }
        count
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "[CMD] Ack sweeper started (timeout {}s, every {}ms)",
                self.timeout.as_secs(),
                self.period.as_millis()
            );
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
