use std::sync::Weak;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Inner, Orchestrator};
use crate::config::TestInterval;

/// A running repeat task. Each tick dispatches one test run.
pub(crate) struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: TestInterval,
}

impl Ticker {
    pub(crate) fn interval(&self) -> TestInterval {
        self.interval
    }

    /// Stop future ticks. Runs already dispatched are left alone.
    pub(crate) fn stop(self) -> JoinHandle<()> {
        self.token.cancel();
        self.handle
    }
}

/// Spawn the repeat task. The first tick fires one full period from now;
/// callers wanting an immediate run dispatch it themselves.
///
/// Holds only a weak reference so a dropped orchestrator ends the loop.
pub(crate) fn spawn_ticker(orchestrator: Weak<Inner>, interval: TestInterval) -> Ticker {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let period = interval.period();
    let first_tick = Instant::now() + period;

    let handle = tokio::spawn(async move {
        info!(%interval, "test schedule started");
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = orchestrator.upgrade() else { break };
                    let orchestrator = Orchestrator::from_inner(inner);
                    // Detached so a slow run never delays the next tick; a tick
                    // landing on a busy engine is dropped by the engine guard.
                    tokio::spawn(async move {
                        orchestrator.run_single_test().await;
                    });
                }
            }
        }
        debug!(%interval, "test schedule stopped");
    });

    Ticker {
        token,
        handle,
        interval,
    }
}
