use crate::automation::{wait_visible_enabled, Locator, Page};
use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::events::Reporter;

/// Progress of one class through the pre-submission screens.
///
/// Terminal success is `SampleAsinsUnchecked`; a class that never leaves
/// `SearchPage` is skipped by the caller without aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    SearchPage,
    ClassInputReady,
    ClassSelected,
    SampleTestOpened,
    SampleAsinsUnchecked,
}

/// Drives the page from the class search screen to "ready to enter ASINs"
/// for `class_name`.
///
/// The class-name input is polled for visibility and enablement; when the
/// poll budget runs out the search page is reloaded and the whole attempt
/// repeated, up to `nav_attempts` times. Only that step is fatal for the
/// class; later steps degrade to a logged warning because some flows land
/// on the right screen without them.
pub async fn navigate_to_class(
    page: &dyn Page,
    cfg: &RunConfig,
    class_name: &str,
    reporter: &Reporter,
) -> Result<NavState, AutomationError> {
    let class_input = Locator::auto(&cfg.selectors.class_input);

    // SearchPage -> ClassInputReady
    let mut ready = false;
    for attempt in 1..=cfg.nav_attempts {
        if wait_visible_enabled(page, &class_input, cfg.visibility_polls, cfg.poll_interval_ms)
            .await
        {
            ready = true;
            break;
        }
        reporter.report(&format!(
            "Attempt {}: Could not find class input for '{}'. Reloading class search page...",
            attempt, class_name
        ));
        page.goto(&cfg.search_url).await?;
        page.sleep(cfg.reload_settle_ms).await;
    }
    if !ready {
        return Err(AutomationError::Timeout(format!(
            "class input for '{}' never became ready after {} attempts",
            class_name, cfg.nav_attempts
        )));
    }

    // ClassInputReady -> ClassSelected
    page.type_and_submit(&class_input, class_name).await?;
    page.sleep(500).await;
    reporter.report(&format!("Class name '{}' entered successfully.", class_name));

    let class_link = Locator::link_exact_text(class_name);
    page.wait_for(&class_link, cfg.class_link_timeout).await?;
    page.click(&class_link).await?;
    page.sleep(1000).await;

    // ClassSelected -> SampleTestOpened
    open_sample_test(page, cfg, reporter).await;
    page.sleep(1000).await;

    // SampleTestOpened -> SampleAsinsUnchecked
    uncheck_sample_asins(page, cfg, reporter).await;
    page.sleep(500).await;

    Ok(NavState::SampleAsinsUnchecked)
}

/// Clicks the "new sample ASINs test" control, primary locator first, then
/// the fallback. Non-fatal: some classes are already on the test screen.
async fn open_sample_test(page: &dyn Page, cfg: &RunConfig, reporter: &Reporter) {
    let primary = Locator::auto(&cfg.selectors.sample_test_button);
    let fallback = Locator::auto(&cfg.selectors.sample_test_button_fallback);

    let primary_result = async {
        page.wait_for(&primary, std::time::Duration::from_secs(5)).await?;
        page.click(&primary).await
    }
    .await;

    if primary_result.is_ok() {
        return;
    }

    let fallback_result = async {
        page.wait_for(&fallback, std::time::Duration::from_secs(2)).await?;
        page.click(&fallback).await
    }
    .await;

    if let Err(e) = fallback_result {
        reporter.report(&format!(
            "Could not click 'New sample ASINs test' button: {}",
            e
        ));
    }
}

/// Unchecks "Include sample ASINs provided during the class authoring
/// process" if it is currently checked. Non-fatal.
async fn uncheck_sample_asins(page: &dyn Page, cfg: &RunConfig, reporter: &Reporter) {
    let checkbox = Locator::auto(&cfg.selectors.include_sample_asins_checkbox);

    let result = async {
        if page.is_checked(&checkbox).await? {
            page.click(&checkbox).await?;
            reporter.report("Unchecked the 'Include sample ASINs' box.");
        }
        Ok::<(), AutomationError>(())
    }
    .await;

    if let Err(e) = result {
        reporter.report(&format!("Could not uncheck the box: {}", e));
    }
}
