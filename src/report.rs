//! Plain-text scan reports
//!
//! One file per chat, named `{sanitized title}_{chat id}.txt`:
//!
//! ```text
//! Scan Results for Family (-100123)
//! ============================================================
//! Total Files: 2
//! Total Size: 3.50 MB (0.0034 GB)
//! ============================================================
//!
//! [2024-03-01 12:30] [photo] photo_10.jpg (0.50 MB)
//! [Unknown] [video] clip.mp4 (3.00 MB)
//! ```

use crate::error::Result;
use crate::types::{ScanEntry, ScanResult};
use crate::utils::{bytes_to_mib, safe_component, sanitize_title};
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 60;

/// File name of the report for a scan
pub fn report_file_name(scan: &ScanResult) -> String {
    format!(
        "{}_{}.txt",
        sanitize_title(&scan.title),
        safe_component(scan.chat_id.as_str())
    )
}

/// Render the report body
pub fn render_scan_report(scan: &ScanResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let total_mib = bytes_to_mib(scan.total_bytes);
    let total_gib = total_mib / 1024.0;

    let mut out = String::new();
    out.push_str(&format!(
        "Scan Results for {} ({})\n",
        scan.title, scan.chat_id
    ));
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Total Files: {}\n", scan.total_count));
    out.push_str(&format!(
        "Total Size: {total_mib:.2} MB ({total_gib:.4} GB)\n"
    ));
    out.push_str(&rule);
    out.push_str("\n\n");

    for entry in &scan.entries {
        out.push_str(&render_entry(entry));
        out.push('\n');
    }
    out
}

fn render_entry(entry: &ScanEntry) -> String {
    let item = &entry.item;
    let date = item
        .timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let name = if item.file_name.is_empty() {
        "Unknown"
    } else {
        item.file_name.as_str()
    };
    format!(
        "[{date}] [{}] {name} ({:.2} MB)",
        item.kind,
        bytes_to_mib(item.size_or_zero())
    )
}

/// Write the report of `scan` into `dir`, creating the directory if needed
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn write_scan_report(dir: &Path, scan: &ScanResult) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_file_name(scan));
    tokio::fs::write(&path, render_scan_report(scan)).await?;
    tracing::info!(
        chat_id = %scan.chat_id,
        path = %path.display(),
        entries = scan.entries.len(),
        "Wrote scan report"
    );
    Ok(path)
}

/// Write one report per scan that found media; failures are logged and skipped.
///
/// Returns how many reports were written.
pub async fn write_scan_reports(dir: &Path, scans: &[ScanResult]) -> usize {
    let mut written = 0;
    for scan in scans.iter().filter(|scan| scan.total_count > 0) {
        match write_scan_report(dir, scan).await {
            Ok(_) => written += 1,
            Err(e) => {
                tracing::warn!(chat_id = %scan.chat_id, error = %e, "Failed to write scan report");
            }
        }
    }
    written
}
