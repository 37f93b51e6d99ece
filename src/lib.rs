pub mod automation;
pub mod batch;
pub mod collator;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod input_loader;
pub mod logger;
pub mod marketplace;
pub mod navigation;
pub mod orchestrator;
pub mod session;
pub mod suffixes;
pub mod webdriver;

// Exporting types for convenience
pub use automation::{Locator, Page, Session};
pub use config::RunConfig;
pub use error::AutomationError;
pub use events::{CancelFlag, Reporter, RunEvent};
pub use input_loader::{ClassGroup, InputRow};
pub use orchestrator::{RunOutcome, RunState};
pub use suffixes::SuffixList;
