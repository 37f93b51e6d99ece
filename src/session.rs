use std::time::Duration;

use crate::automation::{Locator, Page, Session};
use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::events::Reporter;

/// Owns the browser session and its current page for the duration of a run.
///
/// Responsibilities: getting past the manual SSO login on session start, and
/// replacing the page every `recycle_every` processed classes so one
/// long-lived page cannot accumulate resources. Shutdown is expected to be
/// called on every exit path.
pub struct SessionManager {
    session: Box<dyn Session>,
    page: Option<Box<dyn Page>>,
}

impl SessionManager {
    pub fn new(session: Box<dyn Session>) -> Self {
        SessionManager {
            session,
            page: None,
        }
    }

    /// Opens the first page, navigates to the class search screen and waits
    /// out the SSO login if the site redirects us there.
    pub async fn start(&mut self, cfg: &RunConfig, reporter: &Reporter) -> Result<(), AutomationError> {
        let page = self.session.new_page().await?;
        page.goto(&cfg.search_url).await?;
        reporter.report("Navigated to class search page.");

        let post_login = Locator::auto(&cfg.post_login_selector);

        let url = page.current_url().await.unwrap_or_default();
        if cfg.sso_url_markers.iter().any(|m| url.contains(m)) {
            reporter.report(
                "SSO login required. Please complete the login in the opened browser window.",
            );
            // Login is a manual human step; block until the post-login
            // element shows up, however long that takes.
            while page
                .wait_for(&post_login, Duration::from_secs(30))
                .await
                .is_err()
            {}
            reporter.report("Login successful. Continuing automation.");
        }

        page.wait_for(&post_login, Duration::from_secs(10)).await?;
        page.sleep(500).await;

        self.page = Some(page);
        Ok(())
    }

    /// The current page. Panics if called before `start`; the orchestrator
    /// upholds that ordering.
    pub fn page(&self) -> &dyn Page {
        self.page
            .as_deref()
            .expect("session not started")
    }

    /// Swaps in a fresh page when the class counter says it is due. A
    /// recycle failure ends the run, since the old page is already gone.
    pub async fn maybe_recycle(
        &mut self,
        cfg: &RunConfig,
        processed_classes: usize,
        reporter: &Reporter,
    ) -> Result<(), AutomationError> {
        if processed_classes == 0 || processed_classes % cfg.recycle_every != 0 {
            return Ok(());
        }
        let Some(old) = self.page.take() else {
            return Ok(());
        };

        match self.session.recycle_page(old).await {
            Ok(fresh) => {
                reporter.report(&format!(
                    "Page recycled after {} classes (session preserved).",
                    processed_classes
                ));
                fresh.goto(&cfg.search_url).await?;
                fresh.sleep(1000).await;
                self.page = Some(fresh);
                Ok(())
            }
            Err(e) => {
                reporter.report(&format!("Error recycling page: {}", e));
                // Without a page the run cannot continue.
                Err(e)
            }
        }
    }

    /// Tears the session down; errors are reported, never propagated, so
    /// shutdown is safe on every exit path.
    pub async fn shutdown(&mut self, reporter: &Reporter) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                reporter.report(&format!("Error closing page: {}", e));
            }
        }
        if let Err(e) = self.session.close().await {
            reporter.report(&format!("Error closing browser session: {}", e));
        } else {
            reporter.report("Browser session closed.");
        }
    }
}
