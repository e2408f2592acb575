//! Plain-text summary tables sized to the terminal.

use crate::result::{FinalPhase, SamplingResult};
use crate::suite::SuiteReport;
use std::fmt::Write as _;
use terminal_size::{terminal_size, Width};

/// Terminal width clamped to a usable range; 80 when not attached to a terminal.
fn term_width() -> usize {
    if let Some((Width(w), _)) = terminal_size() {
        (w as usize).clamp(40, 200)
    } else {
        80
    }
}

/// Truncate with an ellipsis if longer than `width` characters
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// Columns: 12 x 4 numbers + 6 reps + 9 CI + 6 spaces + 2 indent
const FIXED_WIDTH: usize = 71;

/// Render one result as a table.
pub fn render_result(title: &str, result: &SamplingResult, width: usize) -> String {
    let name_width = width.saturating_sub(FIXED_WIDTH).max(12);
    let table_width = name_width + FIXED_WIDTH - 2;
    let mut out = String::new();

    let status = match result.phase() {
        FinalPhase::Converged => "converged",
        FinalPhase::CappedAtMax => "capped without convergence",
    };
    let _ = writeln!(out, "  {} ({} trials, {})", title, result.trials(), status);
    let _ = writeln!(out, "  {}", "─".repeat(table_width));
    let _ = writeln!(
        out,
        "  {:<n$} {:>12} {:>12} {:>12} {:>12} {:>6} {:>9}",
        "Metric",
        "Mean",
        "Median",
        "Stdev",
        "CV",
        "Reps",
        "CI width",
        n = name_width
    );
    let _ = writeln!(out, "  {}", "─".repeat(table_width));

    for (name, summary) in result.metrics() {
        let ci = result
            .convergence()
            .get(name)
            .and_then(|s| s.relative_width)
            .map(|r| format!("{:.2}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "  {:<n$} {:>12.4e} {:>12.4e} {:>12.4e} {:>11.2}% {:>6} {:>9}",
            truncate(name.as_str(), name_width),
            summary.mean,
            summary.median,
            summary.stdev,
            summary.cv() * 100.0,
            summary.repetitions,
            ci,
            n = name_width
        );
    }
    out
}

pub fn print_result(title: &str, result: &SamplingResult) {
    println!("{}", render_result(title, result, term_width()));
}

/// Print every configuration of a suite; failures are listed after the tables.
pub fn print_suite(report: &SuiteReport) {
    let width = term_width();
    for (entry, result) in report.successes() {
        let title = format!("{} [{}]", entry.workload, entry.params.label());
        println!("{}", render_result(&title, result, width));
    }
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("  Failed configurations:");
        for (entry, err) in failures {
            println!("    {} [{}]: {}", entry.workload, entry.params.label(), err);
        }
        println!();
    }
}
