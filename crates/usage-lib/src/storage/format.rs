//! Byte and share rendering

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Bytes in the largest binary unit whose value is at least 1, rounded
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", value.round_ties_even() as u64, UNITS[unit])
}

/// Rounded percentage of `total`; 0 when nothing is used
pub fn share_percent(bytes: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (100.0 * bytes as f64 / total as f64).round_ties_even() as u64
}
