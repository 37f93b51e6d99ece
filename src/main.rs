use std::error::Error;
use std::path::PathBuf;

use log::{error, info};

use xcp_runner::orchestrator::{make_export_dir, run};
use xcp_runner::webdriver::WebDriverSession;
use xcp_runner::{logger, CancelFlag, Reporter, RunConfig, SuffixList};
use xcp_runner::input_loader::load_class_groups;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logger::init();
    info!("Starting XCP batch runner...");

    let mut args = std::env::args().skip(1);
    let Some(input_file) = args.next() else {
        error!("Usage: xcp_runner <input.xlsx|input.csv> [webdriver-url]");
        return Ok(());
    };

    let mut cfg = RunConfig::default();
    if let Some(url) = args.next() {
        cfg.webdriver_url = url;
    }

    // 1. Load and group the input rows.
    let suffixes = SuffixList::default();
    let groups = load_class_groups(&input_file, &suffixes)?;
    if groups.is_empty() {
        error!("No class groups found in {}. Nothing to do.", input_file);
        return Ok(());
    }
    info!(
        "Loaded {} class groups, {} ASINs total.",
        groups.len(),
        groups.iter().map(|g| g.asins.len()).sum::<usize>()
    );

    // 2. Prepare the dated export directory.
    let export_dir = make_export_dir(&PathBuf::from("."))?;
    info!("Exports will be written to {:?}", export_dir);

    // 3. Start the browser session. Downloads are staged next to the
    // exports before being renamed into place.
    let staging_dir = export_dir.join(".downloads");
    let session = WebDriverSession::connect(&cfg.webdriver_url, &staging_dir).await?;

    // 4. Drive the run. Ctrl-C requests a cooperative stop; the class in
    // flight finishes before the loop exits.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Stop requested; finishing the current class...");
                cancel.request_stop();
            }
        });
    }

    let reporter = Reporter::new(None, Some(PathBuf::from("xcp_runner.log")));
    let outcome = run(
        Box::new(session),
        &cfg,
        &groups,
        &export_dir,
        &reporter,
        &cancel,
    )
    .await?;

    info!(
        "Run finished: {}/{} classes processed{}.",
        outcome.classes_processed,
        outcome.classes_total,
        if outcome.stopped_by_user {
            " (stopped by user)"
        } else {
            ""
        }
    );
    match outcome.collated_file {
        Some(path) => info!("Collated output: {:?}", path),
        None => info!("No collated output was produced."),
    }
    Ok(())
}
