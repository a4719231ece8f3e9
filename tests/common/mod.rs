#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use speedwatch::config::{FallbackPolicy, Settings, TestInterval};
use speedwatch::probes::{ProbeError, ProbeKind, ProbeRunner, ProbeSample};
use speedwatch::reading::Reading;
use speedwatch::scheduler::Orchestrator;
use speedwatch::storage::{HistoryRepository, MemoryRepository};
use speedwatch::throughput::{MeasurementEngine, ProbePlan};

/// Deterministic probe runner. Every download takes `delay`; a full run is
/// counted once per ping.
pub struct FakeRunner {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    delay_ms: AtomicU64,
    failing: AtomicBool,
    runs: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            download_mbps: 80.0,
            upload_mbps: 20.0,
            ping_ms: 15.0,
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            failing: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn check(&self, kind: ProbeKind) -> Result<(), ProbeError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ProbeError::Status { kind, status: 500 })
        } else {
            Ok(())
        }
    }
}

// `mbps` sustained over one second.
fn one_second_at(mbps: f64) -> ProbeSample {
    ProbeSample::new((mbps * 125_000.0) as u64, Duration::from_secs(1))
}

#[async_trait::async_trait]
impl ProbeRunner for FakeRunner {
    async fn download(&self, _bytes: usize) -> Result<ProbeSample, ProbeError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check(ProbeKind::Download)?;
        Ok(one_second_at(self.download_mbps))
    }

    async fn upload(&self, _bytes: usize) -> Result<ProbeSample, ProbeError> {
        self.check(ProbeKind::Upload)?;
        Ok(one_second_at(self.upload_mbps))
    }

    async fn ping(&self) -> Result<Duration, ProbeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.check(ProbeKind::Ping)?;
        Ok(Duration::from_millis(self.ping_ms as u64))
    }
}

/// Repository whose writes always fail; loads return nothing.
#[derive(Default)]
pub struct FailingRepository {
    pub save_attempts: AtomicUsize,
    pub clear_attempts: AtomicUsize,
}

impl HistoryRepository for FailingRepository {
    fn load(&self) -> Result<Vec<Reading>> {
        Ok(Vec::new())
    }

    fn save(&self, _readings: &[Reading]) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        bail!("disk full")
    }

    fn clear(&self) -> Result<()> {
        self.clear_attempts.fetch_add(1, Ordering::SeqCst);
        bail!("database is locked")
    }
}

pub fn plan(fallback: FallbackPolicy) -> ProbePlan {
    ProbePlan {
        download_sizes: vec![100 * 1024, 500 * 1024, 1024 * 1024],
        upload_sizes: vec![50 * 1024, 100 * 1024],
        run_timeout: Duration::from_secs(10),
        fallback,
    }
}

pub fn settings(interval: TestInterval, max_history_size: usize, auto_cleanup: bool) -> Settings {
    Settings {
        interval,
        max_history_size,
        auto_cleanup,
    }
}

pub fn orchestrator_with(
    runner: Arc<FakeRunner>,
    settings: Settings,
    fallback: FallbackPolicy,
    repository: Arc<dyn HistoryRepository>,
) -> Orchestrator {
    let engine = MeasurementEngine::new(runner, plan(fallback));
    Orchestrator::new(engine, settings, repository)
}

pub fn orchestrator(runner: Arc<FakeRunner>, settings: Settings) -> (Orchestrator, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let orch = orchestrator_with(runner, settings, FallbackPolicy::Synthesize, repo.clone());
    (orch, repo)
}
