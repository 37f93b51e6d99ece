use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use calamine::{open_workbook_auto, Reader};

use crate::automation::{Locator, Page};
use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::events::Reporter;
use crate::marketplace::marketplace_label;

/// A downloaded per-(class, batch) report, normalized to CSV.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub class_identifier: String,
    pub file_path: PathBuf,
}

/// Waits for testing to finish, optionally selects the group's marketplace,
/// downloads the report and normalizes it to CSV in `export_dir`.
///
/// The enablement of the export control is the proxy for "server-side ASIN
/// testing has completed". Whatever happens, the page is returned to the
/// class search screen afterwards so the class/batch cycle can repeat.
pub async fn export_results(
    page: &dyn Page,
    cfg: &RunConfig,
    class_batch_label: &str,
    export_dir: &Path,
    marketplace_id: Option<&str>,
    reporter: &Reporter,
) -> Result<Option<ExportArtifact>, AutomationError> {
    let result = download_and_normalize(
        page,
        cfg,
        class_batch_label,
        export_dir,
        marketplace_id,
        reporter,
    )
    .await;

    if let Err(e) = &result {
        reporter.report(&format!(
            "Could not export results for class {}: {}",
            class_batch_label, e
        ));
    }

    // Back to a fresh search page for the next class/batch, even after a
    // failed export.
    page.goto(&cfg.search_url).await?;
    reporter.report("Returned to fresh Class Search page.");

    Ok(result.unwrap_or(None))
}

async fn download_and_normalize(
    page: &dyn Page,
    cfg: &RunConfig,
    class_batch_label: &str,
    export_dir: &Path,
    marketplace_id: Option<&str>,
    reporter: &Reporter,
) -> Result<Option<ExportArtifact>, AutomationError> {
    let export_btn = Locator::auto(&cfg.selectors.export_button);

    page.wait_for(&export_btn, cfg.export_ready_timeout).await?;
    let deadline = Instant::now() + cfg.export_ready_timeout;
    while !page.is_enabled(&export_btn).await.unwrap_or(false) {
        if Instant::now() >= deadline {
            return Err(AutomationError::Timeout(
                "export control never became enabled".to_string(),
            ));
        }
        page.sleep(cfg.export_poll_ms).await;
    }
    reporter.report("ASINs tested, export button is now enabled.");

    if let Some(id) = marketplace_id {
        select_marketplace(page, cfg, id, reporter).await;
    }

    let downloaded = page
        .click_and_capture_download(&export_btn, cfg.download_timeout)
        .await?;

    let raw_path = export_dir.join(format!(
        "export_{}.xlsx",
        sanitize_file_stem(class_batch_label)
    ));
    move_file(&downloaded, &raw_path)?;
    reporter.report(&format!(
        "Downloaded export for class {} as {:?}",
        class_batch_label, raw_path
    ));

    let csv_path = normalize_artifact(&raw_path, reporter)?;
    Ok(Some(ExportArtifact {
        class_identifier: class_batch_label.to_string(),
        file_path: csv_path,
    }))
}

/// Selects the marketplace matching the group's two-letter code in the
/// export dropdown. Every failure mode here is a logged warning: export
/// without a forced marketplace is still useful.
async fn select_marketplace(page: &dyn Page, cfg: &RunConfig, marketplace_id: &str, reporter: &Reporter) {
    let Some(mut label) = marketplace_label(marketplace_id).map(str::to_string) else {
        reporter.report(&format!(
            "Unknown marketplace_id '{}', skipping dropdown selection.",
            marketplace_id
        ));
        return;
    };

    let trigger = Locator::auto(&cfg.selectors.marketplace_dropdown);
    let option = Locator::auto(&cfg.selectors.marketplace_option);

    let result = async {
        page.wait_for(&trigger, std::time::Duration::from_secs(10)).await?;
        page.click(&trigger).await?;
        page.sleep(cfg.dropdown_settle_ms).await;

        let options = page.all_texts(&option).await?;
        reporter.report(&format!("Found {} marketplace options.", options.len()));

        if !options.iter().any(|o| *o == label) {
            match options.iter().find(|o| o.eq_ignore_ascii_case(&label)) {
                Some(found) => {
                    reporter.report(&format!("Found case-insensitive match: {}", found));
                    label = found.clone();
                }
                None => {
                    reporter.report(&format!(
                        "Warning: marketplace '{}' not found in dropdown options, continuing without selection.",
                        label
                    ));
                    return Ok::<(), AutomationError>(());
                }
            }
        }

        let index = options.iter().position(|o| *o == label).unwrap_or(0);
        page.click(&option.nth(index)).await?;
        reporter.report(&format!(
            "Selected marketplace '{}' for id '{}'.",
            label, marketplace_id
        ));
        Ok(())
    }
    .await;

    if let Err(e) = result {
        reporter.report(&format!("Error selecting marketplace: {}", e));
    }
}

/// Converts a downloaded report to canonical CSV.
///
/// Spreadsheet parse is attempted first; failing that the file is treated as
/// CSV that merely wears a spreadsheet extension (the remote system does
/// that). Either way exactly one `.csv` file remains and the original is
/// deleted. Neither parse succeeding is a `DownloadFormat` error.
pub fn normalize_artifact(path: &Path, reporter: &Reporter) -> Result<PathBuf, AutomationError> {
    let csv_path = path.with_extension("csv");

    match read_spreadsheet_rows(path) {
        Ok(rows) => {
            write_rows_as_csv(&csv_path, &rows)?;
            fs::remove_file(path)?;
            reporter.report(&format!("Converted export to CSV: {:?}", csv_path));
            Ok(csv_path)
        }
        Err(_) => match rewrite_as_csv(path, &csv_path) {
            Ok(()) => {
                if path != csv_path {
                    fs::remove_file(path)?;
                }
                reporter.report(&format!("Downloaded file was CSV, saved as: {:?}", csv_path));
                Ok(csv_path)
            }
            Err(e) => Err(AutomationError::DownloadFormat(format!(
                "{:?}: {}",
                path, e
            ))),
        },
    }
}

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<String>>, AutomationError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| AutomationError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AutomationError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| AutomationError::Spreadsheet(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect())
}

fn write_rows_as_csv(path: &Path, rows: &[Vec<String>]) -> Result<(), AutomationError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Re-parses `src` as CSV and writes it to `dest`, erroring if the content
/// is not text/CSV at all.
fn rewrite_as_csv(src: &Path, dest: &Path) -> Result<(), AutomationError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(src)?;

    let mut rows: Vec<csv::StringRecord> = Vec::new();
    for record in rdr.records() {
        rows.push(record?);
    }
    if rows.is_empty() {
        return Err(AutomationError::DownloadFormat(format!(
            "{:?} is empty",
            src
        )));
    }

    let mut writer = csv::Writer::from_path(dest)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Makes a class/batch label safe as a file stem.
fn sanitize_file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Renames, falling back to copy+delete when the staging directory lives on
/// another filesystem.
fn move_file(from: &Path, to: &Path) -> Result<(), AutomationError> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
