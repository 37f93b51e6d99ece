//! End-to-end orchestrator scenarios against the scripted fake session.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{FakeSession, FakeState, SharedState};
use xcp_runner::input_loader::ClassGroup;
use xcp_runner::orchestrator::run;
use xcp_runner::{CancelFlag, Reporter, RunConfig, SuffixList};

struct Fixture {
    state: SharedState,
    cfg: RunConfig,
    export_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let export_dir = tmp.path().join("exports");
    let staging = tmp.path().join("staging");
    fs::create_dir_all(&export_dir).unwrap();
    fs::create_dir_all(&staging).unwrap();

    Fixture {
        state: Arc::new(Mutex::new(FakeState::working(staging))),
        cfg: RunConfig::default(),
        export_dir,
        _tmp: tmp,
    }
}

fn group(name: &str, count: usize, marketplace: Option<&str>) -> ClassGroup {
    let suffixes = SuffixList::default();
    ClassGroup {
        raw_name: name.to_string(),
        cleaned_name: suffixes.clean_class_name(name),
        asins: (0..count).map(|i| format!("{}{:06}", &name[..1], i)).collect(),
        marketplace_id: marketplace.map(str::to_string),
    }
}

fn export_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("export_") && n.ends_with(".csv"))
        .collect();
    names.sort();
    names
}

fn collated_row_count(path: &Path) -> usize {
    csv::Reader::from_path(path).unwrap().records().count()
}

#[tokio::test]
async fn two_groups_split_into_batches_and_collate() {
    let fx = fixture();
    let groups = vec![
        group("WidgetClass_US", 1200, Some("US")),
        group("GadgetClass", 1200, None),
    ];

    let outcome = run(
        Box::new(FakeSession::new(fx.state.clone())),
        &fx.cfg,
        &groups,
        &fx.export_dir,
        &Reporter::log_only(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.classes_total, 2);
    assert_eq!(outcome.classes_processed, 2);
    assert!(!outcome.stopped_by_user);

    let state = fx.state.lock().unwrap();

    // Suffix cleaning happened before searching, and each group was
    // re-navigated between its two batches: one search per (class, batch).
    assert_eq!(
        state.searched_classes,
        vec!["WidgetClass", "WidgetClass", "GadgetClass", "GadgetClass"]
    );

    // 1,200 ASINs -> 900 + 300, order preserved.
    let sizes: Vec<usize> = state.filled_batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![900, 300, 900, 300]);
    let widget_rejoined: Vec<String> = state.filled_batches[..2].concat();
    assert_eq!(widget_rejoined, groups[0].asins);
    let gadget_rejoined: Vec<String> = state.filled_batches[2..].concat();
    assert_eq!(gadget_rejoined, groups[1].asins);

    // The marketplace was forced only for the group that declared one,
    // once per batch export.
    assert_eq!(
        state.selected_marketplaces,
        vec!["amazon.com", "amazon.com"]
    );

    // One normalized CSV per (class, batch), no leftover spreadsheets.
    assert_eq!(
        export_files(&fx.export_dir),
        vec![
            "export_GadgetClass_batch1.csv",
            "export_GadgetClass_batch2.csv",
            "export_WidgetClass_batch1.csv",
            "export_WidgetClass_batch2.csv",
        ]
    );
    assert!(!fs::read_dir(&fx.export_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().ends_with(".xlsx")));

    // Collated rows equal the sum of all per-file rows.
    let collated = outcome.collated_file.expect("collated file");
    assert_eq!(collated_row_count(&collated), 2400);

    assert!(state.session_closed);
}

#[tokio::test]
async fn unreachable_class_input_skips_classes_without_aborting() {
    let fx = fixture();
    fx.state.lock().unwrap().class_input_ready = false;
    let groups = vec![group("AlphaClass", 10, None), group("BetaClass", 10, None)];

    let outcome = run(
        Box::new(FakeSession::new(fx.state.clone())),
        &fx.cfg,
        &groups,
        &fx.export_dir,
        &Reporter::log_only(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    // Both classes were attempted and skipped; the run itself succeeded.
    assert_eq!(outcome.classes_processed, 2);
    assert!(outcome.collated_file.is_none());

    let state = fx.state.lock().unwrap();
    assert!(state.searched_classes.is_empty());
    assert!(state.filled_batches.is_empty());
    assert!(state.session_closed);
    assert!(export_files(&fx.export_dir).is_empty());
}

#[tokio::test]
async fn missing_class_link_skips_only_that_class() {
    let fx = fixture();
    fx.state
        .lock()
        .unwrap()
        .broken_class_links
        .insert("AlphaClass".to_string());
    let groups = vec![group("AlphaClass", 10, None), group("BetaClass", 10, None)];

    let outcome = run(
        Box::new(FakeSession::new(fx.state.clone())),
        &fx.cfg,
        &groups,
        &fx.export_dir,
        &Reporter::log_only(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.classes_processed, 2);
    assert_eq!(export_files(&fx.export_dir), vec!["export_BetaClass_batch1.csv"]);
    assert_eq!(
        collated_row_count(&outcome.collated_file.unwrap()),
        10
    );
}

#[tokio::test]
async fn stop_request_finishes_current_class_then_exits() {
    let fx = fixture();
    let cancel = CancelFlag::new();
    // Trip the flag once the first class's second batch has downloaded;
    // the loop must notice it only at the next class boundary.
    fx.state.lock().unwrap().cancel_after_downloads = Some((2, cancel.clone()));
    let groups = vec![
        group("AlphaClass", 1000, None),
        group("BetaClass", 1000, None),
    ];

    let outcome = run(
        Box::new(FakeSession::new(fx.state.clone())),
        &fx.cfg,
        &groups,
        &fx.export_dir,
        &Reporter::log_only(),
        &cancel,
    )
    .await
    .unwrap();

    assert!(outcome.stopped_by_user);
    assert_eq!(outcome.classes_processed, 1);

    let state = fx.state.lock().unwrap();
    assert_eq!(state.searched_classes.len(), 2); // initial + between-batch re-navigation
    assert!(state
        .searched_classes
        .iter()
        .all(|c| c == "AlphaClass"));
    drop(state);

    // Collation still covers whatever was exported before the stop.
    assert_eq!(
        export_files(&fx.export_dir),
        vec![
            "export_AlphaClass_batch1.csv",
            "export_AlphaClass_batch2.csv",
        ]
    );
    assert_eq!(collated_row_count(&outcome.collated_file.unwrap()), 1000);
    assert!(fx.state.lock().unwrap().session_closed);
}

#[tokio::test]
async fn run_can_be_driven_from_a_spawned_task() {
    // The control server spawns runs onto the runtime, which requires the
    // whole run future, page handles included, to move between threads.
    let fx = fixture();
    let groups = vec![group("AClass", 5, None)];
    let cfg = fx.cfg.clone();
    let state = fx.state.clone();
    let export_dir = fx.export_dir.clone();

    let handle = tokio::spawn(async move {
        run(
            Box::new(FakeSession::new(state)),
            &cfg,
            &groups,
            &export_dir,
            &Reporter::log_only(),
            &CancelFlag::new(),
        )
        .await
    });

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.classes_processed, 1);
    assert!(fx.state.lock().unwrap().session_closed);
}

#[tokio::test]
async fn page_is_recycled_on_schedule() {
    let fx = fixture();
    let mut cfg = fx.cfg.clone();
    cfg.recycle_every = 2;
    let groups = vec![
        group("AClass", 5, None),
        group("BClass", 5, None),
        group("CClass", 5, None),
    ];

    let outcome = run(
        Box::new(FakeSession::new(fx.state.clone())),
        &cfg,
        &groups,
        &fx.export_dir,
        &Reporter::log_only(),
        &CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.classes_processed, 3);
    assert_eq!(export_files(&fx.export_dir).len(), 3);
    // One initial page plus one recycle before the third class.
    assert_eq!(fx.state.lock().unwrap().pages_opened, 2);
}
