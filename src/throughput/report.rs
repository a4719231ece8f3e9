//! Human-readable formatting of readings and statistics.

use crate::analysis::stats::Statistics;
use crate::reading::Reading;

/// Format a speed, switching to Gbps above 1000 Mbps.
pub fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Format a reading as a one-line summary.
pub fn format_summary(reading: &Reading) -> String {
    format!(
        "{}  down {}  up {}  ping {:.0} ms",
        reading.timestamp.format("%Y-%m-%d %H:%M:%S"),
        format_speed(reading.download_speed),
        format_speed(reading.upload_speed),
        reading.ping,
    )
}

/// Format aggregate statistics as a short multi-line block.
pub fn format_statistics(stats: &Statistics) -> String {
    if stats.total_tests == 0 {
        return "No readings recorded.".to_string();
    }
    format!(
        "Tests:    {}\nDownload: avg {} / max {}\nUpload:   avg {} / max {}\nPing:     avg {:.1} ms / min {:.1} ms",
        stats.total_tests,
        format_speed(stats.avg_download),
        format_speed(stats.max_download),
        format_speed(stats.avg_upload),
        format_speed(stats.max_upload),
        stats.avg_ping,
        stats.min_ping,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_speed_gbps() {
        assert_eq!(format_speed(9412.0), "9.41 Gbps");
    }

    #[test]
    fn test_format_speed_mbps() {
        assert_eq!(format_speed(245.3), "245.3 Mbps");
        assert_eq!(format_speed(0.1), "0.1 Mbps");
    }

    #[test]
    fn test_format_summary() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap();
        let r = Reading::clamped(1, ts, 85.23, 12.0, 17.6);
        let s = format_summary(&r);
        assert!(s.starts_with("2024-03-01 12:00:05"));
        assert!(s.contains("down 85.2 Mbps"));
        assert!(s.contains("up 12.0 Mbps"));
        assert!(s.contains("ping 18 ms"));
    }

    #[test]
    fn test_format_statistics_empty() {
        assert_eq!(
            format_statistics(&Statistics::default()),
            "No readings recorded."
        );
    }
}
