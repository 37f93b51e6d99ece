use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use log::error;

use crate::automation::Session;
use crate::batch::{split_batches, submit_batch};
use crate::collator::collate_exports;
use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::events::{CancelFlag, Reporter};
use crate::export::export_results;
use crate::input_loader::ClassGroup;
use crate::navigation::navigate_to_class;
use crate::session::SessionManager;

/// Mutable state of one run, snapshotted into the final summary.
#[derive(Debug, Clone)]
pub struct RunState {
    pub is_processing: bool,
    pub current_class_index: usize,
    pub export_dir: PathBuf,
}

/// What a finished (or stopped) run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub classes_total: usize,
    pub classes_processed: usize,
    pub export_dir: PathBuf,
    pub collated_file: Option<PathBuf>,
    pub stopped_by_user: bool,
}

/// Creates the dated export directory for a run, under `base_dir`.
pub fn make_export_dir(base_dir: &Path) -> Result<PathBuf, AutomationError> {
    let dir = base_dir.join(format!("exports_{}", Local::now().format("%Y-%m-%d")));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Runs the whole class/batch loop over `groups` and collates the results.
///
/// Sequential by design: the remote session holds authentication state that
/// is not safe to drive from more than one context. The cancel flag is
/// honored at class boundaries only; whatever is in flight for the current
/// class finishes first. Session teardown and collation happen on every
/// exit path, including cancellation and fatal errors.
pub async fn run(
    session: Box<dyn Session>,
    cfg: &RunConfig,
    groups: &[ClassGroup],
    export_dir: &Path,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<RunOutcome, AutomationError> {
    let mut state = RunState {
        is_processing: true,
        current_class_index: 0,
        export_dir: export_dir.to_path_buf(),
    };

    let mut manager = SessionManager::new(session);
    reporter.set_status("Initializing...");
    reporter.set_progress(0.3);

    let loop_result = match manager.start(cfg, reporter).await {
        Ok(()) => {
            reporter.report("Browser session initialized successfully.");
            reporter.set_progress(0.4);
            drive_classes(&mut manager, cfg, groups, export_dir, reporter, cancel, &mut state)
                .await
        }
        Err(e) => Err(AutomationError::Session(format!(
            "could not start browser session: {}",
            e
        ))),
    };

    // Guaranteed teardown and collation, whatever happened above.
    manager.shutdown(reporter).await;

    let collated_file = match collate_exports(export_dir, reporter) {
        Ok(path) => path,
        Err(e) => {
            error!("Error collating exports: {}", e);
            None
        }
    };

    let processed = state.current_class_index;
    state.is_processing = false;
    reporter.set_status("Idle");

    loop_result?;
    Ok(RunOutcome {
        classes_total: groups.len(),
        classes_processed: processed,
        export_dir: export_dir.to_path_buf(),
        collated_file,
        stopped_by_user: cancel.is_cancelled(),
    })
}

async fn drive_classes(
    manager: &mut SessionManager,
    cfg: &RunConfig,
    groups: &[ClassGroup],
    export_dir: &Path,
    reporter: &Reporter,
    cancel: &CancelFlag,
    state: &mut RunState,
) -> Result<(), AutomationError> {
    let total = groups.len();
    let start = Instant::now();

    for (i, group) in groups.iter().enumerate() {
        // Cooperative stop, checked only here: the class in flight always
        // finishes before the loop exits.
        if cancel.is_cancelled() {
            reporter.report("Processing stopped by user");
            break;
        }

        manager.maybe_recycle(cfg, i, reporter).await?;

        state.current_class_index = i + 1;
        reporter.set_status(&format!(
            "Processing class {}/{}: {}",
            i + 1,
            total,
            group.cleaned_name
        ));
        reporter.report(&format!(
            "Processing class {}/{}: {}",
            i + 1,
            total,
            group.cleaned_name
        ));

        let class_start = Instant::now();
        match process_class(manager, cfg, group, export_dir, reporter).await {
            Ok(()) => {
                reporter.report(&format!(
                    "Class '{}' processed in {:.2} seconds.",
                    group.cleaned_name,
                    class_start.elapsed().as_secs_f64()
                ));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                reporter.report(&format!(
                    "Error processing class {}: {}",
                    group.cleaned_name, e
                ));
            }
        }

        reporter.set_progress(0.4 + 0.6 * (i + 1) as f64 / total.max(1) as f64);
    }

    if !cancel.is_cancelled() {
        reporter.report(&format!(
            "All classes processed in {:.2} minutes.",
            start.elapsed().as_secs_f64() / 60.0
        ));
    }
    Ok(())
}

/// One class-group end to end: navigation, then every batch submitted and
/// exported, re-navigating between batches. A batch that cannot be filled is
/// abandoned alone; the remaining batches still run.
async fn process_class(
    manager: &SessionManager,
    cfg: &RunConfig,
    group: &ClassGroup,
    export_dir: &Path,
    reporter: &Reporter,
) -> Result<(), AutomationError> {
    let page = manager.page();
    navigate_to_class(page, cfg, &group.cleaned_name, reporter).await?;

    let batches = split_batches(&group.asins, cfg.batch_size);
    let total_batches = batches.len();

    for batch in &batches {
        reporter.report(&format!(
            "Processing batch {}/{} for class {} with {} ASINs.",
            batch.index,
            batch.total,
            group.cleaned_name,
            batch.asins.len()
        ));

        match submit_batch(page, cfg, batch, reporter).await {
            Ok(()) => {
                let label = format!("{}_batch{}", group.cleaned_name, batch.index);
                export_results(
                    page,
                    cfg,
                    &label,
                    export_dir,
                    group.marketplace_id.as_deref(),
                    reporter,
                )
                .await?;
            }
            Err(e) => {
                reporter.report(&format!(
                    "Abandoning batch {}/{} for class {}: {}",
                    batch.index, batch.total, group.cleaned_name, e
                ));
                // Export navigates back itself; a failed submission has to
                // do it here before the next batch can start over.
                page.goto(&cfg.search_url).await?;
            }
        }

        if batch.index < total_batches {
            page.sleep(1000).await;
            navigate_to_class(page, cfg, &group.cleaned_name, reporter).await?;
        }
    }

    Ok(())
}
