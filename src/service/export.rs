//! CSV export of monthly reports

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::MonthlyReportRow;

/// Errors that can occur while writing a report file
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("report file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

const HEADER: [&str; 2] = ["service_name", "revenue"];

/// Distinguishes temporary files of concurrent exports within this process
static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(0);

/// Write `rows` to `directory/file_name` as semicolon-separated values.
///
/// The directory is created if missing. Rows go to a temporary file in the
/// same directory which is then renamed over `file_name`, so readers see
/// either the previous report or the complete new one.
/// Blocking; call from `spawn_blocking`.
pub fn write_report(
    directory: &Path,
    file_name: &str,
    rows: &[MonthlyReportRow],
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(directory)?;
    let path = directory.join(file_name);
    let tmp = directory.join(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
    ));

    let written =
        write_rows(&tmp, rows).and_then(|()| fs::rename(&tmp, &path).map_err(ExportError::from));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written.map(|()| path)
}

fn write_rows(path: &Path, rows: &[MonthlyReportRow]) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(HEADER)?;
    for row in rows {
        let revenue = row.revenue.to_string();
        writer.write_record([row.service_name.as_str(), revenue.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
