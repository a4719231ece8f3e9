//! Test orchestrator: one-shot and continuous measurement, current status,
//! and the reading history it feeds.

mod engine;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use self::engine::{spawn_ticker, Ticker};
use crate::analysis::stats::{self, Statistics};
use crate::config::{AppConfig, ConfigError, Settings, TestInterval};
use crate::history::{DateRange, HistoryStore, Retention};
use crate::probes::HttpProbeRunner;
use crate::reading::Reading;
use crate::storage::{HistoryRepository, SqliteRepository};
use crate::throughput::{MeasurementEngine, ProbePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Idle,
    Testing,
    Completed,
    Error,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Idle => write!(f, "idle"),
            TestStatus::Testing => write!(f, "testing"),
            TestStatus::Completed => write!(f, "completed"),
            TestStatus::Error => write!(f, "error"),
        }
    }
}

/// Latest measured values plus orchestrator status.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub download_speed: f64,
    pub upload_speed: f64,
    pub ping: f64,
    pub status: TestStatus,
}

/// What a single test invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Completed(Reading),
    /// The engine was busy; no state changed.
    AlreadyRunning,
    /// The run failed; status is now `error`.
    Failed(String),
}

pub(crate) struct Inner {
    engine: MeasurementEngine,
    state: RwLock<CurrentState>,
    history: RwLock<HistoryStore>,
    settings: RwLock<Settings>,
    repository: Arc<dyn HistoryRepository>,
    ticker: Mutex<Option<Ticker>>,
}

/// Cheap to clone; all clones drive the same engine and history.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator and load persisted history. Unreadable history
    /// is logged and treated as empty.
    pub fn new(
        engine: MeasurementEngine,
        settings: Settings,
        repository: Arc<dyn HistoryRepository>,
    ) -> Self {
        let persisted = repository.load().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load reading history, starting empty");
            Vec::new()
        });
        if let Some(newest) = persisted.iter().map(|r| r.id).max() {
            engine.resume_ids_after(newest);
        }
        let history = HistoryStore::from_persisted(persisted, Retention::from(&settings));
        info!(readings = history.len(), "reading history loaded");

        Self {
            inner: Arc::new(Inner {
                engine,
                state: RwLock::new(CurrentState::default()),
                history: RwLock::new(history),
                settings: RwLock::new(settings),
                repository,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// HTTP probes and SQLite history as described by `cfg`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        cfg.validate()?;
        let runner = HttpProbeRunner::new(&cfg.probes).context("failed to build probe runner")?;
        let engine = MeasurementEngine::new(Arc::new(runner), ProbePlan::from(&cfg.probes));
        let repository = SqliteRepository::open(&cfg.storage.db_path).with_context(|| {
            format!(
                "failed to open history database {}",
                cfg.storage.db_path.display()
            )
        })?;
        Ok(Self::new(engine, cfg.settings.clone(), Arc::new(repository)))
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    // -----------------------------------------------------------------------
    // Single runs
    // -----------------------------------------------------------------------

    /// Run one full speed test and record the result.
    pub async fn run_single_test(&self) -> TestOutcome {
        let Some(permit) = self.inner.engine.try_acquire() else {
            debug!("speed test already in progress, skipping");
            return TestOutcome::AlreadyRunning;
        };

        self.inner.state.write().await.status = TestStatus::Testing;

        match self.inner.engine.measure(&permit).await {
            Ok(reading) => {
                self.record(&reading).await;
                TestOutcome::Completed(reading)
            }
            Err(e) => {
                error!(error = %e, "speed test failed");
                self.inner.state.write().await.status = TestStatus::Error;
                TestOutcome::Failed(e.to_string())
            }
        }
    }

    async fn record(&self, reading: &Reading) {
        {
            let mut history = self.inner.history.write().await;
            let evicted = history.append(reading.clone());
            if evicted > 0 {
                debug!(evicted, kept = history.len(), "evicted oldest readings");
            }
            // Saved before the lock is released so saves land in append order.
            let snapshot = history.snapshot();
            let repository = Arc::clone(&self.inner.repository);
            let saved = tokio::task::spawn_blocking(move || repository.save(&snapshot)).await;
            log_persist_failure("failed to persist reading history", saved);
        }

        *self.inner.state.write().await = CurrentState {
            download_speed: reading.download_speed,
            upload_speed: reading.upload_speed,
            ping: reading.ping,
            status: TestStatus::Completed,
        };
    }

    // -----------------------------------------------------------------------
    // Continuous mode
    // -----------------------------------------------------------------------

    /// Begin continuous testing: one immediate run, then one per interval.
    /// Returns false if continuous testing was already on.
    pub async fn start_testing(&self) -> bool {
        let mut ticker = self.inner.ticker.lock().await;
        self.start_locked(&mut ticker).await
    }

    /// Stop scheduling runs. A run already in flight still completes and is
    /// recorded. Returns false if continuous testing was off.
    pub async fn stop_testing(&self) -> bool {
        let mut ticker = self.inner.ticker.lock().await;
        Self::stop_locked(&mut ticker)
    }

    /// Start if stopped, stop if started. Returns the new running flag.
    pub async fn toggle_testing(&self) -> bool {
        let mut ticker = self.inner.ticker.lock().await;
        if ticker.is_some() {
            Self::stop_locked(&mut ticker);
            false
        } else {
            self.start_locked(&mut ticker).await
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.ticker.lock().await.is_some()
    }

    /// Interval of the active schedule, if continuous testing is on.
    pub async fn active_interval(&self) -> Option<TestInterval> {
        self.inner.ticker.lock().await.as_ref().map(Ticker::interval)
    }

    async fn start_locked(&self, ticker: &mut MutexGuard<'_, Option<Ticker>>) -> bool {
        if ticker.is_some() {
            debug!("continuous testing already running");
            return false;
        }

        let interval = self.inner.settings.read().await.interval;
        **ticker = Some(spawn_ticker(Arc::downgrade(&self.inner), interval));
        info!(%interval, "continuous testing started");

        let this = self.clone();
        tokio::spawn(async move {
            this.run_single_test().await;
        });
        true
    }

    fn stop_locked(ticker: &mut MutexGuard<'_, Option<Ticker>>) -> bool {
        match ticker.take() {
            Some(t) => {
                drop(t.stop());
                info!("continuous testing stopped");
                true
            }
            None => false,
        }
    }

    /// Replace the active schedule with one at `interval`. In-flight runs are
    /// untouched and no extra run is dispatched.
    async fn reschedule(&self, interval: TestInterval) {
        let mut ticker = self.inner.ticker.lock().await;
        if let Some(old) = ticker.take() {
            drop(old.stop());
            *ticker = Some(spawn_ticker(Arc::downgrade(&self.inner), interval));
            info!(%interval, "continuous testing rescheduled");
        }
    }

    /// Stop continuous testing and wait for the schedule task to exit.
    pub async fn shutdown(&self) {
        let ticker = self.inner.ticker.lock().await.take();
        if let Some(t) = ticker {
            if let Err(e) = t.stop().await {
                warn!(error = %e, "test schedule task ended abnormally");
            }
            info!("continuous testing stopped");
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub async fn settings(&self) -> Settings {
        self.inner.settings.read().await.clone()
    }

    pub async fn set_interval(&self, interval: TestInterval) {
        {
            let mut settings = self.inner.settings.write().await;
            if settings.interval == interval {
                return;
            }
            settings.interval = interval;
        }
        self.reschedule(interval).await;
    }

    /// Replace all settings. Retention changes apply from the next append.
    pub async fn update_settings(&self, new: Settings) -> Result<(), ConfigError> {
        new.validate()?;
        let previous_interval = {
            let mut settings = self.inner.settings.write().await;
            let previous = settings.interval;
            *settings = new.clone();
            previous
        };
        self.inner
            .history
            .write()
            .await
            .set_retention(Retention::from(&new));
        info!(
            interval = %new.interval,
            max_history_size = new.max_history_size,
            auto_cleanup = new.auto_cleanup,
            "settings updated"
        );

        if new.interval != previous_interval {
            self.reschedule(new.interval).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub async fn current_state(&self) -> CurrentState {
        *self.inner.state.read().await
    }

    /// True while a measurement is in flight.
    pub fn is_testing(&self) -> bool {
        self.inner.engine.is_running()
    }

    pub async fn latest_reading(&self) -> Option<Reading> {
        self.inner.history.read().await.latest().cloned()
    }

    pub async fn history_snapshot(&self) -> Vec<Reading> {
        self.inner.history.read().await.snapshot()
    }

    pub async fn history_in_range(&self, range: &DateRange) -> Vec<Reading> {
        self.inner.history.read().await.in_range(range, Utc::now())
    }

    pub async fn statistics(&self) -> Statistics {
        stats::compute(self.inner.history.read().await.as_slice())
    }

    /// Empty the history and the persisted copy.
    pub async fn clear_history(&self) {
        let mut history = self.inner.history.write().await;
        let dropped = history.len();
        history.clear();
        let repository = Arc::clone(&self.inner.repository);
        let cleared = tokio::task::spawn_blocking(move || repository.clear()).await;
        log_persist_failure("failed to clear persisted reading history", cleared);
        info!(dropped, "reading history cleared");
    }
}

/// Repository errors never fail a run; they are logged and the in-memory
/// history stays authoritative.
fn log_persist_failure(message: &str, result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "{}", message),
        Err(e) => warn!(error = %e, "{} (storage task aborted)", message),
    }
}
