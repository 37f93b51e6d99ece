use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::error;
use serde::Serialize;
use tokio::sync::mpsc;

use xcp_runner::input_loader::load_class_groups;
use xcp_runner::orchestrator::{make_export_dir, run};
use xcp_runner::webdriver::WebDriverSession;
use xcp_runner::{CancelFlag, Reporter, RunConfig, RunEvent, SuffixList};

/// Observer-facing snapshot of one run.
#[derive(Clone, Serialize)]
pub struct RunStatus {
    pub id: String,
    pub status: String, // "queued", "processing", "stopping", "stopped", "completed", "failed"
    pub total_classes: usize,
    pub processed_classes: usize,
    pub current_status: String,
    pub progress: f64,
    pub logs: Vec<String>,
    pub export_dir: Option<PathBuf>,
    pub collated_file: Option<PathBuf>,
}

/// Keeps the status map and cancel flags for every run started over HTTP.
///
/// One run drives one browser session; runs are independent but each is
/// internally strictly sequential.
pub struct RunManager {
    pub runs: Arc<Mutex<HashMap<String, RunStatus>>>,
    cancels: Arc<Mutex<HashMap<String, CancelFlag>>>,
    pub suffixes: Arc<Mutex<SuffixList>>,
    cfg: RunConfig,
}

impl RunManager {
    pub fn new(cfg: RunConfig) -> Self {
        RunManager {
            runs: Arc::new(Mutex::new(HashMap::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            suffixes: Arc::new(Mutex::new(SuffixList::default())),
            cfg,
        }
    }

    pub fn start_run(&self, run_id: String, input_path: PathBuf, output_base: PathBuf) -> String {
        let initial = RunStatus {
            id: run_id.clone(),
            status: "queued".to_string(),
            total_classes: 0,
            processed_classes: 0,
            current_status: "Initializing...".to_string(),
            progress: 0.0,
            logs: vec!["Run started.".to_string()],
            export_dir: None,
            collated_file: None,
        };
        self.runs.lock().unwrap().insert(run_id.clone(), initial);

        let cancel = CancelFlag::new();
        self.cancels
            .lock()
            .unwrap()
            .insert(run_id.clone(), cancel.clone());

        let runs = self.runs.clone();
        let suffixes = self.suffixes.lock().unwrap().clone();
        let cfg = self.cfg.clone();
        let id = run_id.clone();

        tokio::spawn(async move {
            Self::execute(id, runs, cfg, suffixes, cancel, input_path, output_base).await;
        });

        run_id
    }

    /// Requests a cooperative stop; the class in flight finishes first.
    pub fn stop(&self, run_id: &str) -> bool {
        let cancels = self.cancels.lock().unwrap();
        let Some(cancel) = cancels.get(run_id) else {
            return false;
        };
        cancel.request_stop();
        if let Some(status) = self.runs.lock().unwrap().get_mut(run_id) {
            if status.status == "processing" {
                status.status = "stopping".to_string();
                status.logs.push("Stop requested by user.".to_string());
            }
        }
        true
    }

    async fn execute(
        run_id: String,
        runs: Arc<Mutex<HashMap<String, RunStatus>>>,
        cfg: RunConfig,
        suffixes: SuffixList,
        cancel: CancelFlag,
        input_path: PathBuf,
        output_base: PathBuf,
    ) {
        let update = {
            let runs = runs.clone();
            let run_id = run_id.clone();
            move |f: &mut dyn FnMut(&mut RunStatus)| {
                let mut guard = runs.lock().unwrap();
                if let Some(status) = guard.get_mut(&run_id) {
                    f(status);
                }
            }
        };

        let fail = |message: String| {
            update(&mut |status| {
                status.status = "failed".to_string();
                status.logs.push(message.clone());
            });
        };

        // Load and group the input.
        update(&mut |status| status.progress = 0.1);
        let groups = match load_class_groups(&input_path, &suffixes) {
            Ok(groups) => groups,
            Err(e) => {
                fail(format!("Input validation failed: {}", e));
                return;
            }
        };

        let export_dir = match make_export_dir(&output_base) {
            Ok(dir) => dir,
            Err(e) => {
                fail(format!("Could not create export directory: {}", e));
                return;
            }
        };

        update(&mut |status| {
            status.status = "processing".to_string();
            status.total_classes = groups.len();
            status.export_dir = Some(export_dir.clone());
            status.progress = 0.2;
        });

        // Pump orchestrator events into the status snapshot.
        let (tx, mut rx) = mpsc::unbounded_channel::<RunEvent>();
        let pump = {
            let runs = runs.clone();
            let run_id = run_id.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let mut guard = runs.lock().unwrap();
                    let Some(status) = guard.get_mut(&run_id) else {
                        break;
                    };
                    match event {
                        RunEvent::Log(message) => {
                            status.logs.push(message);
                            if status.logs.len() > 50 {
                                status.logs.remove(0);
                            }
                        }
                        RunEvent::Status(text) => status.current_status = text,
                        RunEvent::Progress(fraction) => status.progress = fraction,
                    }
                }
            })
        };

        let reporter = Reporter::new(Some(tx), Some(PathBuf::from("xcp_runner.log")));

        let staging_dir = export_dir.join(".downloads");
        let session = match WebDriverSession::connect(&cfg.webdriver_url, &staging_dir).await {
            Ok(session) => session,
            Err(e) => {
                fail(format!("Could not start browser session: {}", e));
                return;
            }
        };

        let result = run(
            Box::new(session),
            &cfg,
            &groups,
            &export_dir,
            &reporter,
            &cancel,
        )
        .await;

        drop(reporter);
        let _ = pump.await;

        match result {
            Ok(outcome) => {
                update(&mut |status| {
                    status.processed_classes = outcome.classes_processed;
                    status.collated_file = outcome.collated_file.clone();
                    status.progress = 1.0;
                    status.status = if outcome.stopped_by_user {
                        "stopped".to_string()
                    } else {
                        "completed".to_string()
                    };
                });
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                fail(format!("Run failed: {}", e));
            }
        }
    }
}
