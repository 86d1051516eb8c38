//! Human-readable formatting for dashboard values.

use chrono::TimeZone;
use std::fmt::Display;

const BYTE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const SPEED_UNITS: [&str; 5] = ["B/s", "K/s", "M/s", "G/s", "T/s"];
const STEP: f64 = 1024.0;

const DURATION_BUCKETS: [(u64, &str); 6] = [
    (365 * 86_400, "y"),
    (30 * 86_400, "mo"),
    (86_400, "d"),
    (3_600, "h"),
    (60, "m"),
    (1, "s"),
];

// fixed decimals with trailing zeros dropped: 1.50 -> "1.5", 2.00 -> "2"
fn trim_fixed(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

fn scale(value: f64, decimals: usize, units: &[&str]) -> String {
    if !value.is_finite() || value <= 0.0 {
        return format!("0 {}", units[0]);
    }
    let mut i = 0;
    let mut scaled = value;
    while scaled >= STEP && i < units.len() - 1 {
        scaled /= STEP;
        i += 1;
    }
    format!("{} {}", trim_fixed(scaled, decimals), units[i])
}

pub fn format_bytes(bytes: f64, decimals: usize) -> String {
    scale(bytes, decimals, &BYTE_UNITS)
}

pub fn format_speed(bytes_per_sec: f64, decimals: usize) -> String {
    scale(bytes_per_sec, decimals, &SPEED_UNITS)
}

/// Rounded percentage; 0 when `total` is zero or not a number.
pub fn format_percent(value: f64, total: f64) -> i64 {
    if total == 0.0 || !total.is_finite() || !value.is_finite() {
        return 0;
    }
    let percent = (value / total * 100.0).round();
    if percent.is_finite() {
        percent as i64
    } else {
        0
    }
}

/// `90061` -> `"1d 1h 1m 1s"`, cut to `max_parts` components. Years and months are
/// 365 and 30 days.
pub fn format_duration_en_short(seconds: f64, max_parts: usize) -> String {
    if !seconds.is_finite() || seconds < 1.0 {
        return "0s".to_string();
    }
    let mut rest = seconds.floor() as u64;
    let mut parts = Vec::new();
    for (size, unit) in DURATION_BUCKETS {
        let count = rest / size;
        rest %= size;
        if count > 0 {
            parts.push(format!("{}{}", count, unit));
        }
    }
    parts.truncate(max_parts.max(1));
    parts.join(" ")
}

/// Renders the `"{seconds}s"` uptime field. Empty stays empty and anything else
/// unexpected is shown as given.
pub fn humanize_uptime(uptime: &str) -> String {
    if uptime.is_empty() {
        return String::new();
    }
    match uptime
        .strip_suffix('s')
        .and_then(|digits| digits.parse::<u64>().ok())
    {
        Some(seconds) => format_duration_en_short(seconds as f64, 3),
        None => uptime.to_string(),
    }
}

/// `YYYY-MM-DD HH:MM:SS` in `tz`.
pub fn format_date_time<Tz>(epoch_secs: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match tz.timestamp_opt(epoch_secs, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "unknown".to_string(),
    }
}
