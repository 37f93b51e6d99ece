use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::AutomationError;
use crate::events::Reporter;

const SOURCE_COLUMN: &str = "source_file";

/// Characters Excel refuses in column names.
const FORBIDDEN: &[char] = &[
    '/', '\\', '?', '*', '[', ']', ':', ';', '\n', '\r', '\t', '|',
];

/// Replaces spreadsheet-illegal characters with `_` and truncates to 255
/// characters. Idempotent and total.
pub fn sanitize_column(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    cleaned.chars().take(255).collect()
}

/// One parsed per-class report.
struct ParsedExport {
    source: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Merges every normalized export in `export_dir` into one dated CSV.
///
/// Files are taken in name order; a file that fails to parse is logged and
/// skipped, never fatal. Columns are unioned across files in first-seen
/// order, a `source_file` provenance column is appended, and names are
/// sanitized again after concatenation. Returns the combined file's path,
/// or `None` when there was nothing to collate.
pub fn collate_exports(
    export_dir: &Path,
    reporter: &Reporter,
) -> Result<Option<PathBuf>, AutomationError> {
    let files = discover_exports(export_dir)?;
    if files.is_empty() {
        reporter.report("No export files found to collate.");
        return Ok(None);
    }

    let mut parsed = Vec::new();
    for file in &files {
        match parse_export(file) {
            Ok(export) => parsed.push(export),
            Err(e) => {
                reporter.report(&format!(
                    "Could not read file {:?} as CSV. Skipping. ({})",
                    file, e
                ));
            }
        }
    }
    if parsed.is_empty() {
        reporter.report("No export files could be parsed; nothing to collate.");
        return Ok(None);
    }

    // Ordered union of sanitized column names, provenance last.
    let mut columns: Vec<String> = Vec::new();
    for export in &parsed {
        for header in &export.headers {
            if !columns.contains(header) {
                columns.push(header.clone());
            }
        }
    }
    columns.push(SOURCE_COLUMN.to_string());
    // Concatenation can introduce names of its own; sanitize once more.
    let columns: Vec<String> = columns.iter().map(|c| sanitize_column(c)).collect();

    let combined_path = export_dir.join(format!(
        "collated_exports_{}.csv",
        Local::now().format("%Y-%m-%d")
    ));

    let mut writer = match csv::Writer::from_path(&combined_path) {
        Ok(w) => w,
        Err(e) if is_permission_denied(&e) => {
            return Err(locked_error(&combined_path, reporter));
        }
        Err(e) => return Err(e.into()),
    };

    let write_result = (|| -> Result<(), csv::Error> {
        writer.write_record(&columns)?;
        for export in &parsed {
            for row in &export.rows {
                let mut record: Vec<&str> = Vec::with_capacity(columns.len());
                for column in &columns {
                    if column == SOURCE_COLUMN {
                        record.push(&export.source);
                    } else {
                        let value = export
                            .headers
                            .iter()
                            .position(|h| h == column)
                            .and_then(|i| row.get(i))
                            .map(String::as_str)
                            .unwrap_or("");
                        record.push(value);
                    }
                }
                writer.write_record(&record)?;
            }
        }
        writer.flush()?;
        Ok(())
    })();

    match write_result {
        Ok(()) => {
            reporter.report(&format!("Collated all exports into {:?}", combined_path));
            Ok(Some(combined_path))
        }
        Err(e) if is_permission_denied(&e) => Err(locked_error(&combined_path, reporter)),
        Err(e) => Err(e.into()),
    }
}

fn discover_exports(export_dir: &Path) -> Result<Vec<PathBuf>, AutomationError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(export_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            name.starts_with("export_") && name.ends_with(".csv")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn parse_export(path: &Path) -> Result<ParsedExport, AutomationError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(sanitize_column)
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(ParsedExport {
        source: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        headers,
        rows,
    })
}

fn is_permission_denied(e: &csv::Error) -> bool {
    match e.kind() {
        csv::ErrorKind::Io(io) => io.kind() == ErrorKind::PermissionDenied,
        _ => false,
    }
}

fn locked_error(path: &Path, reporter: &Reporter) -> AutomationError {
    let message = format!(
        "Permission denied: Could not write to {:?}. Please close the file if it is open in Excel or another program and try again.",
        path
    );
    reporter.report(&message);
    AutomationError::Permission(message)
}
