use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use log::{error, info};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// One-way notifications from the orchestrator to whatever UI is listening.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum RunEvent {
    Log(String),
    Status(String),
    Progress(f64),
}

/// Observer handle threaded through every orchestration step.
///
/// Messages go three ways: the process log (via `log`), the append-only run
/// log file, and an optional channel to a presentation layer. The reporter
/// never fails; a broken channel or log file degrades to process logging.
#[derive(Clone)]
pub struct Reporter {
    tx: Option<UnboundedSender<RunEvent>>,
    log_path: Option<PathBuf>,
}

impl Reporter {
    pub fn new(tx: Option<UnboundedSender<RunEvent>>, log_path: Option<PathBuf>) -> Self {
        Reporter { tx, log_path }
    }

    /// Reporter that only writes to the process log. Used by tests and by
    /// contexts that have no UI attached.
    pub fn log_only() -> Self {
        Reporter {
            tx: None,
            log_path: None,
        }
    }

    pub fn report(&self, message: &str) {
        info!("{}", message);
        self.append_to_log_file(message);
        self.send(RunEvent::Log(message.to_string()));
    }

    pub fn set_status(&self, status: &str) {
        info!("Status: {}", status);
        self.send(RunEvent::Status(status.to_string()));
    }

    pub fn set_progress(&self, fraction: f64) {
        self.send(RunEvent::Progress(fraction.clamp(0.0, 1.0)));
    }

    fn send(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the UI went away; the run keeps going.
            let _ = tx.send(event);
        }
    }

    fn append_to_log_file(&self, message: &str) {
        let Some(path) = &self.log_path else {
            return;
        };
        let line = format!(
            "{} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            error!("Failed to append to run log {:?}: {}", path, e);
        }
    }
}

/// Cooperative stop request, checked once per class iteration.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn request_stop(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }
}
