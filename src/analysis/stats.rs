use serde::{Deserialize, Serialize};

use crate::reading::Reading;

/// Summary metrics over a history snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub avg_download: f64,
    pub avg_upload: f64,
    pub avg_ping: f64,
    pub max_download: f64,
    pub max_upload: f64,
    pub min_ping: f64,
    pub total_tests: usize,
}

/// Recompute statistics over `history` from scratch. Empty history yields
/// all zeros.
pub fn compute(history: &[Reading]) -> Statistics {
    if history.is_empty() {
        return Statistics::default();
    }

    let count = history.len();
    let n = count as f64;

    let mut sum_download = 0.0;
    let mut sum_upload = 0.0;
    let mut sum_ping = 0.0;
    let mut max_download = f64::MIN;
    let mut max_upload = f64::MIN;
    let mut min_ping = f64::MAX;

    for r in history {
        sum_download += r.download_speed;
        sum_upload += r.upload_speed;
        sum_ping += r.ping;
        max_download = max_download.max(r.download_speed);
        max_upload = max_upload.max(r.upload_speed);
        min_ping = min_ping.min(r.ping);
    }

    Statistics {
        avg_download: sum_download / n,
        avg_upload: sum_upload / n,
        avg_ping: sum_ping / n,
        max_download,
        max_upload,
        min_ping,
        total_tests: count,
    }
}
