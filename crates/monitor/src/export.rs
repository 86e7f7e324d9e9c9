//! CSV export of aggregated records

use anyhow::{Context, Result};
use monitor_lib::AggregatedRecord;
use std::path::Path;

/// Render records as CSV, header first
pub fn render_csv(records: &[AggregatedRecord]) -> String {
    let mut out = AggregatedRecord::csv_header().join(",");
    out.push('\n');
    for record in records {
        out.push_str(&record.to_row().join(","));
        out.push('\n');
    }
    out
}

/// Write records to `path`, replacing any existing file
pub async fn write_csv(path: &Path, records: &[AggregatedRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    tokio::fs::write(path, render_csv(records))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
