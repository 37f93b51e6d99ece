use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AutomationError;

/// How an element is addressed on the remote page.
///
/// Everything the orchestration layer knows about the target DOM goes
/// through this type; see `config::Selectors` for the concrete strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    /// The i-th (0-based) match of the inner locator. Used when several
    /// candidate elements match and the caller probes them one by one.
    Nth(Box<Locator>, usize),
}

impl Locator {
    /// Builds a locator from a selector string, treating anything that
    /// starts with `//` or `xpath=` as XPath and the rest as CSS.
    pub fn auto(selector: &str) -> Locator {
        if let Some(rest) = selector.strip_prefix("xpath=") {
            Locator::XPath(rest.to_string())
        } else if selector.starts_with("//") || selector.starts_with("(//") {
            Locator::XPath(selector.to_string())
        } else {
            Locator::Css(selector.to_string())
        }
    }

    pub fn css(selector: &str) -> Locator {
        Locator::Css(selector.to_string())
    }

    pub fn xpath(expr: &str) -> Locator {
        Locator::XPath(expr.to_string())
    }

    /// Link whose visible text equals `text` exactly.
    pub fn link_exact_text(text: &str) -> Locator {
        Locator::XPath(format!(
            "//a[normalize-space(text())={}]",
            xpath_string_literal(text)
        ))
    }

    pub fn nth(&self, index: usize) -> Locator {
        Locator::Nth(Box::new(self.clone()), index)
    }
}

/// Quotes a string for embedding in an XPath expression. XPath 1.0 has no
/// escape sequence inside literals, so strings containing both quote kinds
/// need concat().
fn xpath_string_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text
            .split('\'')
            .map(|p| format!("'{}'", p))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// One browser page (tab) of the automated session.
///
/// Every operation may fail with `Locator` (element absent or not
/// interactable) or `Timeout`; callers never assume a single attempt
/// succeeds. Each method is a suspension point.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), AutomationError>;
    async fn reload(&self) -> Result<(), AutomationError>;
    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Waits for the locator to match at least one element.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), AutomationError>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool, AutomationError>;
    async fn is_enabled(&self, locator: &Locator) -> Result<bool, AutomationError>;
    async fn is_checked(&self, locator: &Locator) -> Result<bool, AutomationError>;

    async fn click(&self, locator: &Locator) -> Result<(), AutomationError>;
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), AutomationError>;
    /// Clears the element, types `text` and submits (Enter).
    async fn type_and_submit(&self, locator: &Locator, text: &str)
        -> Result<(), AutomationError>;

    /// Number of elements matching the locator right now.
    async fn count(&self, locator: &Locator) -> Result<usize, AutomationError>;
    /// Visible text of every element matching the locator.
    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, AutomationError>;

    /// Clicks the locator and captures the download it triggers, returning
    /// the path the browser saved the file under. The caller owns moving it
    /// to its final name.
    async fn click_and_capture_download(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<PathBuf, AutomationError>;

    /// Yields for the given wall-clock interval.
    async fn sleep(&self, ms: u64);

    /// Closes this page. The session stays alive.
    async fn close(self: Box<Self>) -> Result<(), AutomationError>;
}

/// An authenticated browser session that can hand out pages.
///
/// Both traits require `Sync` so a run holding page references across
/// suspension points can be driven from a spawned task.
#[async_trait]
pub trait Session: Send + Sync {
    /// The first page of the session.
    async fn new_page(&mut self) -> Result<Box<dyn Page>, AutomationError>;

    /// Closes `old` and opens a fresh page in the same session, preserving
    /// authentication state.
    async fn recycle_page(
        &mut self,
        old: Box<dyn Page>,
    ) -> Result<Box<dyn Page>, AutomationError>;

    /// Tears the whole session down.
    async fn close(&mut self) -> Result<(), AutomationError>;
}

/// Polls a locator until it is simultaneously visible and enabled, up to
/// `polls` attempts spaced `interval_ms` apart. Probe errors count as "not
/// ready". Returns whether the element became ready within the budget.
pub async fn wait_visible_enabled(
    page: &dyn Page,
    locator: &Locator,
    polls: u32,
    interval_ms: u64,
) -> bool {
    for _ in 0..polls {
        let visible = page.is_visible(locator).await.unwrap_or(false);
        let enabled = page.is_enabled(locator).await.unwrap_or(false);
        if visible && enabled {
            return true;
        }
        page.sleep(interval_ms).await;
    }
    false
}
