use std::path::{Path, PathBuf};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use log::{debug, warn};

use crate::automation::{Locator, Page, Session};
use crate::error::AutomationError;

impl From<CmdError> for AutomationError {
    fn from(e: CmdError) -> Self {
        match e {
            CmdError::WaitTimeout => {
                AutomationError::Timeout("timed out waiting for element".to_string())
            }
            other => AutomationError::Locator(other.to_string()),
        }
    }
}

impl From<NewSessionError> for AutomationError {
    fn from(e: NewSessionError) -> Self {
        AutomationError::Session(e.to_string())
    }
}

/// WebDriver-backed browser session.
///
/// The session owns one fantoccini client; pages are browser windows within
/// it, so recycling a page keeps cookies and the SSO login intact.
pub struct WebDriverSession {
    client: Client,
    download_dir: PathBuf,
    closed: bool,
}

impl WebDriverSession {
    /// Connects to a WebDriver endpoint and starts a Chrome session whose
    /// downloads land in `download_dir` without a save prompt.
    pub async fn connect(
        webdriver_url: &str,
        download_dir: &Path,
    ) -> Result<WebDriverSession, AutomationError> {
        std::fs::create_dir_all(download_dir)?;

        let mut caps = serde_json::map::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({
                "args": ["--start-maximized"],
                "prefs": {
                    "download.default_directory": download_dir.to_string_lossy(),
                    "download.prompt_for_download": false,
                    "download.directory_upgrade": true,
                },
            }),
        );

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await?;

        Ok(WebDriverSession {
            client,
            download_dir: download_dir.to_path_buf(),
            closed: false,
        })
    }

    fn page_for(&self, window: WindowHandle) -> WebDriverPage {
        WebDriverPage {
            client: self.client.clone(),
            window,
            download_dir: self.download_dir.clone(),
        }
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn new_page(&mut self) -> Result<Box<dyn Page>, AutomationError> {
        let window = self.client.window().await?;
        Ok(Box::new(self.page_for(window)))
    }

    async fn recycle_page(
        &mut self,
        old: Box<dyn Page>,
    ) -> Result<Box<dyn Page>, AutomationError> {
        // Open the replacement first: closing the last window would end the
        // whole WebDriver session.
        let response = self.client.new_window(true).await?;
        if let Err(e) = old.close().await {
            warn!("Error closing recycled page: {}", e);
        }
        self.client.switch_to_window(response.handle.clone()).await?;
        Ok(Box::new(self.page_for(response.handle)))
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.client.clone().close().await?;
        Ok(())
    }
}

/// One browser window of the session.
pub struct WebDriverPage {
    client: Client,
    window: WindowHandle,
    download_dir: PathBuf,
}

impl WebDriverPage {
    fn as_wd<'a>(locator: &'a Locator) -> Option<fantoccini::Locator<'a>> {
        match locator {
            Locator::Css(s) => Some(fantoccini::Locator::Css(s)),
            Locator::XPath(s) => Some(fantoccini::Locator::XPath(s)),
            Locator::Nth(_, _) => None,
        }
    }

    async fn element(&self, locator: &Locator) -> Result<Element, AutomationError> {
        match locator {
            Locator::Nth(inner, index) => {
                let all = self.elements(inner).await?;
                all.into_iter().nth(*index).ok_or_else(|| {
                    AutomationError::Locator(format!("no element at index {} for {:?}", index, inner))
                })
            }
            _ => {
                let wd = Self::as_wd(locator).expect("non-nth locator");
                Ok(self.client.find(wd).await?)
            }
        }
    }

    async fn elements(&self, locator: &Locator) -> Result<Vec<Element>, AutomationError> {
        // Peel nested Nth wrappers up front; the locator itself is not
        // recursive once the base selector is known.
        let mut indices = Vec::new();
        let mut base = locator;
        while let Locator::Nth(inner, index) = base {
            indices.push(*index);
            base = inner;
        }

        let wd = Self::as_wd(base).expect("non-nth locator");
        let mut matched = self.client.find_all(wd).await?;
        for index in indices.into_iter().rev() {
            matched = matched.into_iter().skip(index).take(1).collect();
        }
        Ok(matched)
    }

    /// Lists the download directory, ignoring in-progress browser artifacts.
    fn finished_downloads(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.download_dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.ends_with(".crdownload") || name.ends_with(".tmp") || name.ends_with(".part") {
                continue;
            }
            if path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), AutomationError> {
        self.client.refresh().await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), AutomationError> {
        match locator {
            Locator::Nth(inner, index) => {
                // No single wait command covers "the i-th match exists";
                // poll the match count instead.
                let deadline = Instant::now() + timeout;
                loop {
                    if self.count(inner).await.unwrap_or(0) > *index {
                        return Ok(());
                    }
                    if Instant::now() >= deadline {
                        return Err(AutomationError::Timeout(format!(
                            "element {:?}[{}] did not appear within {:?}",
                            inner, index, timeout
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
            _ => {
                let wd = Self::as_wd(locator).expect("non-nth locator");
                self.client.wait().at_most(timeout).for_element(wd).await?;
                Ok(())
            }
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, AutomationError> {
        match self.element(locator).await {
            Ok(el) => Ok(el.is_displayed().await.unwrap_or(false)),
            Err(_) => Ok(false),
        }
    }

    async fn is_enabled(&self, locator: &Locator) -> Result<bool, AutomationError> {
        match self.element(locator).await {
            Ok(el) => Ok(el.is_enabled().await.unwrap_or(false)),
            Err(_) => Ok(false),
        }
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool, AutomationError> {
        let el = self.element(locator).await?;
        Ok(el.is_selected().await?)
    }

    async fn click(&self, locator: &Locator) -> Result<(), AutomationError> {
        let el = self.element(locator).await?;
        el.click().await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), AutomationError> {
        let el = self.element(locator).await?;
        el.clear().await?;
        el.send_keys(text).await?;
        Ok(())
    }

    async fn type_and_submit(
        &self,
        locator: &Locator,
        text: &str,
    ) -> Result<(), AutomationError> {
        let el = self.element(locator).await?;
        el.click().await?;
        el.clear().await?;
        el.send_keys(text).await?;
        // WebDriver ENTER.
        el.send_keys("\u{E007}").await?;
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize, AutomationError> {
        Ok(self.elements(locator).await?.len())
    }

    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, AutomationError> {
        let mut texts = Vec::new();
        for el in self.elements(locator).await? {
            texts.push(el.text().await?);
        }
        Ok(texts)
    }

    async fn click_and_capture_download(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<PathBuf, AutomationError> {
        let before: Vec<PathBuf> = self.finished_downloads()?;

        let el = self.element(locator).await?;
        el.click().await?;

        // The browser drops the file into the configured download directory;
        // watch for a new entry and wait for its size to settle.
        let deadline = Instant::now() + timeout;
        loop {
            let now: Vec<PathBuf> = self.finished_downloads()?;
            if let Some(new_file) = now.iter().find(|p| !before.contains(p)) {
                let size_a = std::fs::metadata(new_file)?.len();
                tokio::time::sleep(Duration::from_millis(500)).await;
                let size_b = std::fs::metadata(new_file)?.len();
                if size_a == size_b {
                    debug!("Captured download {:?}", new_file);
                    return Ok(new_file.clone());
                }
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "no download appeared within {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn sleep(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn close(self: Box<Self>) -> Result<(), AutomationError> {
        self.client.switch_to_window(self.window.clone()).await?;
        self.client.close_window().await?;
        Ok(())
    }
}
