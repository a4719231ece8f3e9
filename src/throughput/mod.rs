//! Measurement engine: concurrent download/upload/ping probes reduced into a
//! single `Reading`.

pub mod reduce;
pub mod report;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{FallbackPolicy, ProbeConfig};
use crate::probes::{ProbeKind, ProbeRunner};
use crate::reading::{IdClock, Reading};

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("speed test did not finish within {timeout:?}")]
    RunTimedOut { timeout: Duration },
}

/// Result of asking the engine for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Reading),
    /// Another run holds the engine; nothing was started.
    AlreadyRunning,
}

/// Payload sizes and limits for one full run.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub download_sizes: Vec<usize>,
    pub upload_sizes: Vec<usize>,
    pub run_timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl From<&ProbeConfig> for ProbePlan {
    fn from(cfg: &ProbeConfig) -> Self {
        Self {
            download_sizes: cfg.download_sizes.clone(),
            upload_sizes: cfg.upload_sizes.clone(),
            run_timeout: cfg.run_timeout(),
            fallback: cfg.fallback,
        }
    }
}

impl Default for ProbePlan {
    fn default() -> Self {
        Self::from(&ProbeConfig::default())
    }
}

/// Exclusive claim on the engine. Dropping it releases the engine.
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Raw dimension values before the floor clamp.
#[derive(Debug, Clone, Copy)]
struct Dimensions {
    download: f64,
    upload: f64,
    ping: f64,
}

pub struct MeasurementEngine {
    runner: Arc<dyn ProbeRunner>,
    plan: ProbePlan,
    busy: Arc<AtomicBool>,
    ids: IdClock,
}

impl MeasurementEngine {
    pub fn new(runner: Arc<dyn ProbeRunner>, plan: ProbePlan) -> Self {
        Self {
            runner,
            plan,
            busy: Arc::new(AtomicBool::new(false)),
            ids: IdClock::new(),
        }
    }

    /// Keep new reading ids above `id`, typically the newest persisted one.
    pub fn resume_ids_after(&self, id: i64) {
        self.ids.observe(id);
    }

    pub fn plan(&self) -> &ProbePlan {
        &self.plan
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the engine. `None` if a run is already in progress.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Claim the engine and run. Returns `AlreadyRunning` without probing if
    /// another run holds it.
    pub async fn run_speed_test(&self) -> Result<RunOutcome, ThroughputError> {
        match self.try_acquire() {
            Some(permit) => self.measure(&permit).await.map(RunOutcome::Completed),
            None => {
                debug!("speed test already in progress, skipping");
                Ok(RunOutcome::AlreadyRunning)
            }
        }
    }

    /// Run all three dimensions concurrently and combine them into a reading.
    /// The engine stays claimed until the caller drops `permit`.
    pub async fn measure(&self, permit: &RunPermit) -> Result<Reading, ThroughputError> {
        debug_assert!(Arc::ptr_eq(&permit.busy, &self.busy));
        let started = Instant::now();

        let sampled = tokio::time::timeout(self.plan.run_timeout, self.sample_dimensions()).await;

        let reading = match sampled {
            Ok(dims) => {
                let now = Utc::now();
                let reading = Reading::clamped(
                    self.ids.next(now),
                    now,
                    dims.download,
                    dims.upload,
                    dims.ping,
                );
                info!(
                    id = reading.id,
                    download_mbps = reading.download_speed,
                    upload_mbps = reading.upload_speed,
                    ping_ms = reading.ping,
                    elapsed = ?started.elapsed(),
                    "speed test complete"
                );
                reading
            }
            Err(_) => match self.plan.fallback {
                FallbackPolicy::Synthesize => {
                    let reading = self.synthesize();
                    warn!(
                        timeout = ?self.plan.run_timeout,
                        id = reading.id,
                        "speed test failed, recording synthesized reading"
                    );
                    reading
                }
                FallbackPolicy::Surface => {
                    warn!(timeout = ?self.plan.run_timeout, "speed test failed");
                    return Err(ThroughputError::RunTimedOut {
                        timeout: self.plan.run_timeout,
                    });
                }
            },
        };

        Ok(reading)
    }

    async fn sample_dimensions(&self) -> Dimensions {
        let (download, upload, ping) = tokio::join!(
            self.download_dimension(),
            self.upload_dimension(),
            self.ping_dimension(),
        );
        Dimensions {
            download,
            upload,
            ping,
        }
    }

    async fn download_dimension(&self) -> f64 {
        let probes = self.plan.download_sizes.iter().map(|&size| async move {
            match self.runner.download(size).await {
                Ok(sample) => Some(sample.mbps()),
                Err(e) => {
                    debug!(size, error = %e, "download probe failed");
                    None
                }
            }
        });
        let samples = join_all(probes).await;
        Self::reduce_set(ProbeKind::Download, &samples)
    }

    async fn upload_dimension(&self) -> f64 {
        let probes = self.plan.upload_sizes.iter().map(|&size| async move {
            match self.runner.upload(size).await {
                Ok(sample) => Some(sample.mbps()),
                Err(e) => {
                    debug!(size, error = %e, "upload probe failed");
                    None
                }
            }
        });
        let samples = join_all(probes).await;
        Self::reduce_set(ProbeKind::Upload, &samples)
    }

    async fn ping_dimension(&self) -> f64 {
        let sample = match self.runner.ping().await {
            Ok(rtt) => Some(rtt.as_secs_f64() * 1000.0),
            Err(e) => {
                warn!(error = %e, "ping probe failed");
                None
            }
        };
        reduce::single(sample)
    }

    fn reduce_set(kind: ProbeKind, samples: &[Option<f64>]) -> f64 {
        if reduce::all_failed(samples) {
            warn!(%kind, probes = samples.len(), "every probe in the set failed");
        }
        reduce::best_of(samples.iter().copied())
    }

    fn synthesize(&self) -> Reading {
        let (download, upload, ping) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(10.0..60.0),
                rng.gen_range(5.0..25.0),
                rng.gen_range(10.0..40.0),
            )
        };
        let now = Utc::now();
        Reading::clamped(self.ids.next(now), now, download, upload, ping)
    }
}
