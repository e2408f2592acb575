//! Scrape metric values out of workload output.
//!
//! Understands three line shapes:
//! - GNU `/usr/bin/time -v` reports (user/system/wall time, peak RSS),
//! - POSIX `time -p` lines (`real 0.25`, `user 0.20`, `sys 0.01`),
//! - generic `Key: value` or `key = value` lines whose value starts with a number.
//!
//! Generic keys are normalized to lower snake case (`Total Time` -> `total_time`).
//! When a key appears more than once the last value wins.

use crate::metric::{MetricName, TrialResult};

/// `time -v` labels and the metric names they map to.
const GNU_TIME_LABELS: &[(&str, &str)] = &[
    ("User time (seconds)", "user_time_s"),
    ("System time (seconds)", "system_time_s"),
    ("Elapsed (wall clock) time (h:mm:ss or m:ss)", "wall_clock_s"),
    ("Maximum resident set size (kbytes)", "peak_rss_kb"),
];

/// `time -p` line prefixes and their metric names.
const POSIX_TIME_LABELS: &[(&str, &str)] = &[("real", "real_s"), ("user", "user_s"), ("sys", "sys_s")];

/// Parse every recognizable metric from a block of output text.
pub fn parse_metrics(text: &str) -> TrialResult {
    let mut result = TrialResult::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = parse_line(line) {
            result.insert(MetricName::from(name), value);
        }
    }
    result
}

fn parse_line(line: &str) -> Option<(String, f64)> {
    for &(label, name) in GNU_TIME_LABELS {
        if let Some(rest) = line.strip_prefix(label) {
            let value = rest.trim_start().strip_prefix(':')?.trim();
            let parsed = if name == "wall_clock_s" {
                parse_clock(value)?
            } else {
                leading_number(value)?
            };
            return Some((name.to_string(), parsed));
        }
    }

    for &(prefix, name) in POSIX_TIME_LABELS {
        if let Some(rest) = line.strip_prefix(prefix) {
            if rest.starts_with(char::is_whitespace) {
                if let Some(value) = leading_number(rest.trim()) {
                    return Some((name.to_string(), value));
                }
            }
        }
    }

    let (key, value) = line
        .split_once(':')
        .or_else(|| line.split_once('='))?;
    let key = normalize_key(key);
    if key.is_empty() {
        return None;
    }
    Some((key, leading_number(value.trim())?))
}

/// Parse `h:mm:ss`, `m:ss` or plain seconds into seconds.
pub fn parse_clock(value: &str) -> Option<f64> {
    let parts: Vec<f64> = value
        .split(':')
        .map(|p| p.trim().parse::<f64>().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [h, m, s] => Some(h * 3600.0 + m * 60.0 + s),
        [m, s] => Some(m * 60.0 + s),
        [s] => Some(*s),
        _ => None,
    }
}

/// First whitespace-separated token as a finite number; a trailing `%` is dropped.
fn leading_number(value: &str) -> Option<f64> {
    let token = value.split_whitespace().next()?;
    let token = token.trim_end_matches('%').replace(',', ".");
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Lower snake case, non-alphanumeric runs collapsed to one `_`.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
