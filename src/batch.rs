use crate::automation::{Locator, Page};
use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::events::Reporter;

/// A capped-size slice of a class-group's ASINs, submitted together.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// 1-based position within the group, for logging.
    pub index: usize,
    pub total: usize,
    pub asins: &'a [String],
}

/// Splits a group's ASINs into `ceil(n / cap)` contiguous batches.
/// Concatenating the batches in order reproduces the input exactly.
pub fn split_batches(asins: &[String], cap: usize) -> Vec<Batch<'_>> {
    assert!(cap > 0, "batch cap must be positive");
    let total = asins.len().div_ceil(cap);
    asins
        .chunks(cap)
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            total,
            asins: chunk,
        })
        .collect()
}

/// Fills the ASIN entry area with one batch and triggers testing.
///
/// The entry surface sometimes appears more than once in the DOM; the first
/// candidate that is both visible and enabled wins. Filling is retried with
/// a page reload in between; exhausting the attempts abandons this batch
/// only.
pub async fn submit_batch(
    page: &dyn Page,
    cfg: &RunConfig,
    batch: &Batch<'_>,
    reporter: &Reporter,
) -> Result<(), AutomationError> {
    fill_asins(page, cfg, batch, reporter).await?;
    click_test_asins(page, cfg, reporter).await;
    Ok(())
}

async fn fill_asins(
    page: &dyn Page,
    cfg: &RunConfig,
    batch: &Batch<'_>,
    reporter: &Reporter,
) -> Result<(), AutomationError> {
    let textarea = Locator::auto(&cfg.selectors.asin_textarea);
    let text = batch.asins.join("\n");

    for attempt in 1..=cfg.fill_attempts {
        let result = async {
            page.wait_for(&textarea, cfg.asin_area_timeout).await?;

            let count = page.count(&textarea).await?;
            let target = if count > 1 {
                let mut chosen = None;
                for idx in 0..count {
                    let candidate = textarea.nth(idx);
                    let visible = page.is_visible(&candidate).await.unwrap_or(false);
                    let enabled = page.is_enabled(&candidate).await.unwrap_or(false);
                    if visible && enabled {
                        chosen = Some((candidate, idx));
                        break;
                    }
                }
                chosen.ok_or_else(|| {
                    AutomationError::Locator(format!(
                        "none of the {} ASIN input areas is visible and enabled",
                        count
                    ))
                })?
            } else {
                (textarea.nth(0), 0)
            };

            page.fill(&target.0, &text).await?;
            reporter.report(&format!(
                "Filled ASINs textarea (index {}) with {} ASINs.",
                target.1,
                batch.asins.len()
            ));
            page.sleep(500).await;
            Ok::<(), AutomationError>(())
        }
        .await;

        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                reporter.report(&format!("Attempt {}: Could not input ASINs: {}", attempt, e));
                page.reload().await?;
                page.sleep(1000).await;
            }
        }
    }

    Err(AutomationError::Timeout(format!(
        "failed to input ASINs after {} attempts",
        cfg.fill_attempts
    )))
}

/// Clicks "Test sample ASINs", trying the text fallback when the primary
/// locator fails. Non-fatal by contract.
async fn click_test_asins(page: &dyn Page, cfg: &RunConfig, reporter: &Reporter) {
    let primary = Locator::auto(&cfg.selectors.test_asins_button);
    let fallback = Locator::auto(&cfg.selectors.test_asins_button_fallback);

    for locator in [&primary, &fallback] {
        let result = async {
            page.wait_for(locator, std::time::Duration::from_secs(5)).await?;
            page.click(locator).await
        }
        .await;
        if result.is_ok() {
            reporter.report("Clicked 'Test sample ASINs' button.");
            return;
        }
    }
    reporter.report("Could not click 'Test sample ASINs' button.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asins(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("B{:09}", i)).collect()
    }

    #[test]
    fn batch_count_is_ceil_of_size_over_cap() {
        assert_eq!(split_batches(&asins(900), 900).len(), 1);
        assert_eq!(split_batches(&asins(901), 900).len(), 2);
        assert_eq!(split_batches(&asins(1200), 900).len(), 2);
        assert_eq!(split_batches(&asins(2700), 900).len(), 3);
        assert!(split_batches(&[], 900).is_empty());
    }

    #[test]
    fn batches_carry_index_and_total() {
        let all = asins(1200);
        let batches = split_batches(&all, 900);
        assert_eq!(batches[0].index, 1);
        assert_eq!(batches[0].total, 2);
        assert_eq!(batches[0].asins.len(), 900);
        assert_eq!(batches[1].index, 2);
        assert_eq!(batches[1].asins.len(), 300);
    }

    #[test]
    fn concatenating_batches_reproduces_original_order() {
        let all = asins(2345);
        let batches = split_batches(&all, 900);
        let rejoined: Vec<String> = batches
            .iter()
            .flat_map(|b| b.asins.iter().cloned())
            .collect();
        assert_eq!(rejoined, all);
    }
}
