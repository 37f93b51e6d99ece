use std::time::Duration;

/// All retry/poll/timeout knobs for a run.
///
/// The defaults are tuned against the latency profile of the one target
/// application this tool drives; they are fields rather than constants so a
/// deployment can adjust them without a rebuild.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// WebDriver endpoint to connect to.
    pub webdriver_url: String,
    /// The class search page every class/batch cycle starts from.
    pub search_url: String,
    /// URL fragments that indicate we landed on the SSO login flow.
    pub sso_url_markers: Vec<String>,
    /// Element that only exists once login has completed.
    pub post_login_selector: String,

    /// Maximum ASINs submitted per batch.
    pub batch_size: usize,
    /// Polls of the class input before a reload is attempted.
    pub visibility_polls: u32,
    /// Delay between visibility polls.
    pub poll_interval_ms: u64,
    /// Full navigation attempts (each preceded by a page reload) per class.
    pub nav_attempts: u32,
    /// Attempts to fill the ASIN textarea before the batch is abandoned.
    pub fill_attempts: u32,
    /// Settle time after reloading the search page.
    pub reload_settle_ms: u64,
    /// Wait for the exact-text class link after searching.
    pub class_link_timeout: Duration,
    /// Wait for the ASIN textarea to exist.
    pub asin_area_timeout: Duration,
    /// Wait for the export control to become visible (testing in progress).
    pub export_ready_timeout: Duration,
    /// Poll interval while the export control is visible but disabled.
    pub export_poll_ms: u64,
    /// Settle time after opening the marketplace dropdown.
    pub dropdown_settle_ms: u64,
    /// Wait for the intercepted download to land on disk.
    pub download_timeout: Duration,
    /// Recycle the page after this many processed classes.
    pub recycle_every: usize,

    pub selectors: Selectors,
}

/// Every locator the target application is addressed by.
///
/// This is the entire coupling surface to the remote DOM; nothing outside
/// this struct knows what the page looks like.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub class_input: String,
    pub sample_test_button: String,
    pub sample_test_button_fallback: String,
    pub include_sample_asins_checkbox: String,
    pub asin_textarea: String,
    pub test_asins_button: String,
    pub test_asins_button_fallback: String,
    pub export_button: String,
    pub marketplace_dropdown: String,
    pub marketplace_option: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Selectors {
            class_input: r#"input[placeholder*="class name"]"#.to_string(),
            sample_test_button: "#app-content > div > div > div:nth-child(1) > div > div.awsui-util-action-stripe-large > div.awsui-util-action-stripe-group.awsui-util-pv-n > awsui-button:nth-child(1) > a".to_string(),
            sample_test_button_fallback: r#"//*[@id="app-content"]/div/div/div[1]/div/div[2]/div[2]/awsui-button[1]/a"#.to_string(),
            include_sample_asins_checkbox: "//label[contains(normalize-space(.), 'Include sample ASINs provided during the class authoring process')]//input[@type='checkbox']".to_string(),
            asin_textarea: r#"textarea[placeholder^="Enter ASIN"]"#.to_string(),
            test_asins_button: "//button[span[normalize-space(text())='Test sample ASINs']]".to_string(),
            test_asins_button_fallback: "//button[contains(normalize-space(.), 'Test sample ASINs')]".to_string(),
            export_button: "#app-content > div > div:nth-child(3) > div.test-sample-asins-component > div:nth-child(4) > awsui-table > div > div.awsui-table-heading-container > div > div.awsui-table-header > span > div > div.awsui-util-action-stripe-group > awsui-button > button".to_string(),
            marketplace_dropdown: "//*[normalize-space(text())='All marketplaces']".to_string(),
            marketplace_option: ".awsui-select-option".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            webdriver_url: "http://localhost:4444".to_string(),
            search_url: "https://www.cp-central.catalog.amazon.dev/#/class/search".to_string(),
            sso_url_markers: vec![
                "SSO/redirect".to_string(),
                "midway-auth.amazon.com".to_string(),
            ],
            post_login_selector: "#awsui-input-0".to_string(),
            batch_size: 900,
            visibility_polls: 15,
            poll_interval_ms: 200,
            nav_attempts: 3,
            fill_attempts: 3,
            reload_settle_ms: 1500,
            class_link_timeout: Duration::from_secs(5),
            asin_area_timeout: Duration::from_secs(10),
            export_ready_timeout: Duration::from_secs(120),
            export_poll_ms: 500,
            dropdown_settle_ms: 3000,
            download_timeout: Duration::from_secs(60),
            recycle_every: 15,
            selectors: Selectors::default(),
        }
    }
}
