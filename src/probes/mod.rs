//! Network probes: one download, upload, or latency operation each.

use std::time::Duration;

use thiserror::Error;

pub mod http;

pub use self::http::HttpProbeRunner;

/// Which dimension a probe samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Download,
    Upload,
    Ping,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Download => write!(f, "download"),
            ProbeKind::Upload => write!(f, "upload"),
            ProbeKind::Ping => write!(f, "ping"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{kind} request failed: {source}")]
    Transport {
        kind: ProbeKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} request returned HTTP {status}")]
    Status { kind: ProbeKind, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Bytes moved by one throughput probe and how long it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ProbeSample {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Throughput in Mbps (decimal megabits).
    pub fn mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes as f64 * 8.0) / (secs * 1_000_000.0)
    }
}

/// Executes single network operations for the measurement engine.
///
/// Implementations report failure as `Err`; the engine decides how a failed
/// probe counts towards its dimension.
#[async_trait::async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Fetch a payload of `bytes` and time it until the body is fully read.
    async fn download(&self, bytes: usize) -> Result<ProbeSample, ProbeError>;

    /// Send a synthetic payload of `bytes` and time it until the response.
    async fn upload(&self, bytes: usize) -> Result<ProbeSample, ProbeError>;

    /// One lightweight round trip; returns the latency.
    async fn ping(&self) -> Result<Duration, ProbeError>;
}
