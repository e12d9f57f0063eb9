//! Formatting helpers shared by CLI commands.

use chrono::{DateTime, Utc};

/// Compact age of a timestamp: `45s`, `12m`, `2h 30m`, `3d 4h`.
pub fn format_elapsed(since: DateTime<Utc>) -> String {
    format_seconds((Utc::now() - since).num_seconds().max(0))
}

fn format_seconds(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", seconds),
        (0, 0, m) => format!("{}m", m),
        (0, h, m) => format!("{}h {}m", h, m),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}
