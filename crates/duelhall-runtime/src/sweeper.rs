//! Background expiration sweep.
//!
//! Requests also expire lazily whenever a new request or acceptance comes
//! in; the sweeper makes sure a stale request is retired (and its requester
//! told) even when nothing else happens.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::service::DuelService;

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct ExpirationSweeper {
    service: DuelService,
    interval: Duration,
    clock: Clock,
}

impl ExpirationSweeper {
    /// Sweep on the configured interval against wall-clock time.
    pub fn new(service: DuelService) -> Self {
        let interval = service.config().sweep_interval();
        Self {
            service,
            interval,
            clock: Arc::new(crate::now_ms),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the millisecond clock the sweep compares against.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// One sweep pass. Returns how many requests expired.
    pub fn run_once(&self) -> usize {
        self.service.sweep((self.clock)()).len()
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "expiration sweeper started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("expiration sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = self.run_once();
                    if expired > 0 {
                        tracing::debug!(expired, "sweep retired stale requests");
                    }
                }
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

impl std::fmt::Debug for ExpirationSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationSweeper")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
