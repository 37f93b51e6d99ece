use thiserror::Error;

/// Failure taxonomy for a run.
///
/// Only `Validation` (bad input file) and `Session` (the browser session
/// could not be started) abort a whole run. Everything else is contained to
/// the smallest enclosing unit -- a batch or a class -- by the caller.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("input validation failed: {0}")]
    Validation(String),

    #[error("element not located: {0}")]
    Locator(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("downloaded file is neither a spreadsheet nor CSV: {0}")]
    DownloadFormat(String),

    #[error("destination not writable: {0}")]
    Permission(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl AutomationError {
    /// True for errors that must abort the whole run rather than skip a
    /// class or batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::Validation(_) | AutomationError::Session(_)
        )
    }
}
