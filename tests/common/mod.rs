//! In-memory fake of the browser automation interface.
//!
//! Scripts just enough of the remote application's behavior to drive the
//! orchestrator end to end: the class search screen, the ASIN entry surface,
//! the export control and its download. Waits return instantly so retry
//! budgets cost nothing in test time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use xcp_runner::config::Selectors;
use xcp_runner::{AutomationError, CancelFlag, Locator, Page, Session};

#[derive(Default)]
pub struct FakeState {
    /// Whether the class-name input ever becomes visible and enabled.
    pub class_input_ready: bool,
    /// Class names whose result link never appears after searching.
    pub broken_class_links: HashSet<String>,
    /// Dropdown options offered by the export screen.
    pub marketplace_options: Vec<String>,
    /// Trips the given cancel flag once this many downloads completed.
    pub cancel_after_downloads: Option<(usize, CancelFlag)>,

    /// Where "the browser" drops downloaded files.
    pub staging_dir: PathBuf,

    // Recorded interactions, asserted on by tests.
    pub searched_classes: Vec<String>,
    pub filled_batches: Vec<Vec<String>>,
    pub selected_marketplaces: Vec<String>,
    pub downloads: usize,
    pub goto_count: usize,
    pub pages_opened: usize,
    pub session_closed: bool,
}

impl FakeState {
    pub fn working(staging_dir: PathBuf) -> Self {
        FakeState {
            class_input_ready: true,
            marketplace_options: vec![
                "All marketplaces".to_string(),
                "amazon.com".to_string(),
                "amazon.co.uk".to_string(),
            ],
            staging_dir,
            ..FakeState::default()
        }
    }
}

pub type SharedState = Arc<Mutex<FakeState>>;

pub struct FakeSession {
    state: SharedState,
}

impl FakeSession {
    pub fn new(state: SharedState) -> Self {
        FakeSession { state }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn new_page(&mut self) -> Result<Box<dyn Page>, AutomationError> {
        self.state.lock().unwrap().pages_opened += 1;
        Ok(Box::new(FakePage {
            state: self.state.clone(),
            selectors: Selectors::default(),
        }))
    }

    async fn recycle_page(
        &mut self,
        _old: Box<dyn Page>,
    ) -> Result<Box<dyn Page>, AutomationError> {
        self.state.lock().unwrap().pages_opened += 1;
        Ok(Box::new(FakePage {
            state: self.state.clone(),
            selectors: Selectors::default(),
        }))
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        self.state.lock().unwrap().session_closed = true;
        Ok(())
    }
}

/// What a locator refers to on the scripted page.
enum Target {
    ClassInput,
    ClassLink(String),
    AsinTextarea,
    ExportButton,
    MarketplaceDropdown,
    MarketplaceOption,
    Other,
}

pub struct FakePage {
    state: SharedState,
    selectors: Selectors,
}

impl FakePage {
    fn classify(&self, locator: &Locator) -> Target {
        match locator {
            Locator::Nth(inner, _) => self.classify(inner),
            Locator::Css(s) => {
                if *s == self.selectors.class_input {
                    Target::ClassInput
                } else if *s == self.selectors.asin_textarea {
                    Target::AsinTextarea
                } else if *s == self.selectors.export_button {
                    Target::ExportButton
                } else if *s == self.selectors.marketplace_option {
                    Target::MarketplaceOption
                } else {
                    Target::Other
                }
            }
            Locator::XPath(s) => {
                if *s == self.selectors.marketplace_dropdown {
                    Target::MarketplaceDropdown
                } else if s.starts_with("//a[normalize-space(text())=") {
                    // Recover the class name from the exact-text link.
                    let name = s
                        .split('\'')
                        .nth(1)
                        .or_else(|| s.split('"').nth(1))
                        .unwrap_or("")
                        .to_string();
                    Target::ClassLink(name)
                } else {
                    Target::Other
                }
            }
        }
    }

    fn option_index(locator: &Locator) -> Option<usize> {
        match locator {
            Locator::Nth(_, i) => Some(*i),
            _ => None,
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, _url: &str) -> Result<(), AutomationError> {
        self.state.lock().unwrap().goto_count += 1;
        Ok(())
    }

    async fn reload(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok("https://fake.test/#/class/search".to_string())
    }

    async fn wait_for(&self, locator: &Locator, _timeout: Duration) -> Result<(), AutomationError> {
        match self.classify(locator) {
            Target::ClassLink(name) => {
                if self.state.lock().unwrap().broken_class_links.contains(&name) {
                    Err(AutomationError::Timeout(format!(
                        "no link for class '{}'",
                        name
                    )))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, AutomationError> {
        match self.classify(locator) {
            Target::ClassInput => Ok(self.state.lock().unwrap().class_input_ready),
            _ => Ok(true),
        }
    }

    async fn is_enabled(&self, locator: &Locator) -> Result<bool, AutomationError> {
        self.is_visible(locator).await
    }

    async fn is_checked(&self, _locator: &Locator) -> Result<bool, AutomationError> {
        Ok(false)
    }

    async fn click(&self, locator: &Locator) -> Result<(), AutomationError> {
        if let Target::MarketplaceOption = self.classify(locator) {
            let mut state = self.state.lock().unwrap();
            let index = Self::option_index(locator).unwrap_or(0);
            let label = state
                .marketplace_options
                .get(index)
                .cloned()
                .unwrap_or_default();
            state.selected_marketplaces.push(label);
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), AutomationError> {
        if let Target::AsinTextarea = self.classify(locator) {
            let batch: Vec<String> = text.lines().map(str::to_string).collect();
            self.state.lock().unwrap().filled_batches.push(batch);
        }
        Ok(())
    }

    async fn type_and_submit(
        &self,
        locator: &Locator,
        text: &str,
    ) -> Result<(), AutomationError> {
        if let Target::ClassInput = self.classify(locator) {
            self.state
                .lock()
                .unwrap()
                .searched_classes
                .push(text.to_string());
        }
        Ok(())
    }

    async fn count(&self, _locator: &Locator) -> Result<usize, AutomationError> {
        Ok(1)
    }

    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, AutomationError> {
        match self.classify(locator) {
            Target::MarketplaceOption => Ok(self.state.lock().unwrap().marketplace_options.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn click_and_capture_download(
        &self,
        _locator: &Locator,
        _timeout: Duration,
    ) -> Result<PathBuf, AutomationError> {
        let mut state = self.state.lock().unwrap();

        // The remote system serves CSV content under a spreadsheet name,
        // exactly like the real one does.
        let batch = state.filled_batches.last().cloned().unwrap_or_default();
        let mut content = String::from("asin,result\n");
        for asin in &batch {
            content.push_str(asin);
            content.push_str(",PASS\n");
        }

        state.downloads += 1;
        let path = state
            .staging_dir
            .join(format!("download_{}.xlsx", state.downloads));
        std::fs::write(&path, content)?;

        if let Some((after, cancel)) = &state.cancel_after_downloads {
            if state.downloads >= *after {
                cancel.request_stop();
            }
        }

        Ok(path)
    }

    async fn sleep(&self, _ms: u64) {
        // Waits are free in tests.
    }

    async fn close(self: Box<Self>) -> Result<(), AutomationError> {
        Ok(())
    }
}
