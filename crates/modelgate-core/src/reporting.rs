//! Static drift report artifacts (HTML and JSON).

use anyhow::{Context, Result};
use std::path::Path;

use crate::drift::{DriftLevel, DriftReport};

/// Write the report as pretty JSON.
pub fn write_drift_report_json(path: &Path, report: &DriftReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize drift report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a self-contained HTML page with one row per feature.
pub fn render_drift_report_html(report: &DriftReport) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Data Drift Report</title>\n<style>\n");
    out.push_str("body { font-family: sans-serif; margin: 2em; }\n");
    out.push_str("table { border-collapse: collapse; }\n");
    out.push_str("th, td { border: 1px solid #ccc; padding: 4px 12px; text-align: left; }\n");
    out.push_str(".high-drift { background: #f8d7da; }\n");
    out.push_str(".low-drift { background: #d4edda; }\n");
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str("<h1>Data Drift Report</h1>\n");
    out.push_str(&format!(
        "<p>Generated: {}<br>Report: {}<br>Buffered samples: {}<br>Threshold: {}</p>\n",
        report.generated_at.to_rfc3339(),
        report.report_id,
        report.buffered_samples,
        report.threshold
    ));

    if report.features.is_empty() {
        out.push_str("<p>No drift data available.</p>\n");
    } else {
        out.push_str("<table>\n<tr><th>Feature</th><th>Drift Score</th><th>Status</th></tr>\n");
        for f in &report.features {
            let class = match f.level {
                DriftLevel::High => "high-drift",
                DriftLevel::Ok => "low-drift",
            };
            out.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{:.4}</td><td>{}</td></tr>\n",
                class,
                escape_html(&f.feature),
                f.score,
                f.level
            ));
        }
        out.push_str("</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

/// Write the HTML report.
pub fn write_drift_report_html(path: &Path, report: &DriftReport) -> Result<()> {
    let html = render_drift_report_html(report);
    std::fs::write(path, html).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
