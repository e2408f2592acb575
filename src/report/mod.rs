//! Results sinks: JSON and CSV export, plus a terminal summary table.
//!
//! Everything here consumes finished results; nothing feeds back into sampling.

pub mod table;

pub use table::{print_result, print_suite};

use crate::error::Result;
use crate::result::SamplingResult;
use crate::suite::SuiteReport;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize one result in the persisted format.
pub fn to_json_string(result: &SamplingResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn write_json(path: impl AsRef<Path>, result: &SamplingResult) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut out, result)?;
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SuiteRecord<'a> {
    workload: &'a str,
    args: &'a [String],
    compile_definitions: &'a std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a SamplingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Serialize a whole suite: one record per configuration, with either
/// `metrics` (the persisted result) or `error`.
pub fn suite_to_json_string(report: &SuiteReport) -> Result<String> {
    let records: Vec<SuiteRecord<'_>> = report
        .outcomes
        .iter()
        .map(|o| SuiteRecord {
            workload: o.entry.workload.as_str(),
            args: &o.entry.params.args,
            compile_definitions: &o.entry.params.compile_definitions,
            metrics: o.outcome.as_ref().ok(),
            error: o.outcome.as_ref().err().map(|e| e.to_string()),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

pub fn write_suite_json(path: impl AsRef<Path>, report: &SuiteReport) -> Result<()> {
    std::fs::write(path, suite_to_json_string(report)?)?;
    Ok(())
}

const CSV_HEADER: &str =
    "workload,parameters,metric,mean,median,stdev,variance,repetitions,reached_cap_without_convergence";

/// Write the summary of every successful configuration as CSV, one row per metric.
///
/// Failed configurations are skipped.
pub fn write_csv<W: Write>(mut out: W, report: &SuiteReport) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for (entry, result) in report.successes() {
        for (name, summary) in result.metrics() {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{}",
                csv_field(entry.workload.as_str()),
                csv_field(&entry.params.label()),
                csv_field(name.as_str()),
                summary.mean,
                summary.median,
                summary.stdev,
                summary.variance,
                summary.repetitions,
                result.reached_cap_without_convergence()
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn export_csv(path: impl AsRef<Path>, report: &SuiteReport) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), report)
}

/// Quote a field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
