//! Page object for a marketplace front page: search, catalog navigation,
//! listing filters, and the scroll harvest of the resulting listing.
//!
//! Control lookups wait through the shared [`Poller`]. A control that never
//! shows up is a locator problem and surfaces as an error, unlike card fields
//! inside the listing, which fall back to sentinels.

use crate::core::config::{AppConfig, HarvestConfig, MarketLocators};
use crate::core::types::HarvestReport;
use crate::harvest::{Clock, PollOutcome, Poller, ScrollHarvester, TokioClock};
use crate::scraping::{wait_until_ready, CdpListingPage};
use anyhow::{anyhow, bail, Result};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Substitute `{key}` in a CSS locator template with a quoted-string-safe value.
///
/// Templates put the placeholder inside single quotes (`[title='{brand}']`),
/// so backslashes and single quotes in the value are escaped.
pub fn fill_template(template: &str, key: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    template.replace(&format!("{{{}}}", key), &escaped)
}

pub struct MarketPage {
    page: Page,
    locators: MarketLocators,
    harvest: HarvestConfig,
    filter_settle: Duration,
    poller: Poller,
}

impl MarketPage {
    pub fn new(
        page: Page,
        locators: MarketLocators,
        harvest: HarvestConfig,
        filter_settle: Duration,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let poller = Poller::new(clock, harvest.poll_interval, cancel);
        Self {
            page,
            locators,
            harvest,
            filter_settle,
            poller,
        }
    }

    pub fn from_config(page: Page, cfg: &AppConfig, cancel: CancellationToken) -> Self {
        Self::new(
            page,
            cfg.market.resolve_locators(),
            cfg.harvest.resolve(),
            cfg.market.resolve_filter_settle(),
            Arc::new(TokioClock),
            cancel,
        )
    }

    pub async fn open(&self, url: &str) -> Result<()> {
        info!("🌐 opening {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("navigation to {} failed: {}", url, e))?;
        wait_until_ready(&self.page, &self.poller, self.harvest.default_timeout).await
    }

    pub async fn search(&self, query: &str) -> Result<()> {
        info!("🔎 searching for {:?}", query);
        let input = self.wait_visible(&self.locators.search_input).await?;
        input
            .click()
            .await?
            .type_str(query)
            .await?
            .press_key("Enter")
            .await?;
        Ok(())
    }

    pub async fn open_catalog(&self) -> Result<()> {
        self.wait_visible(&self.locators.catalog_button)
            .await?
            .click()
            .await?;
        Ok(())
    }

    pub async fn hover_category(&self, category: &str) -> Result<()> {
        let selector = fill_template(&self.locators.catalog_category, "category", category);
        self.wait_visible(&selector).await?.hover().await?;
        Ok(())
    }

    pub async fn open_subcategory(&self, subcategory: &str) -> Result<()> {
        let selector = fill_template(
            &self.locators.catalog_subcategory,
            "subcategory",
            subcategory,
        );
        self.wait_visible(&selector).await?.click().await?;
        Ok(())
    }

    pub async fn set_price_min(&self, price: u64) -> Result<()> {
        self.type_into(&self.locators.price_min, &price.to_string())
            .await
    }

    pub async fn set_price_max(&self, price: u64) -> Result<()> {
        self.type_into(&self.locators.price_max, &price.to_string())
            .await
    }

    /// Tick each brand checkbox, pausing after every click so the listing
    /// can re-render before the next lookup.
    pub async fn select_brands<S: AsRef<str>>(&self, brands: &[S]) -> Result<()> {
        for brand in brands {
            let brand = brand.as_ref();
            let selector = fill_template(&self.locators.brand_checkbox, "brand", brand);
            self.wait_visible(&selector).await?.click().await?;
            debug!("brand {:?} selected, settling {}ms", brand, self.filter_settle.as_millis());
            self.settle().await?;
        }
        Ok(())
    }

    /// Block until at least one listing card is laid out.
    pub async fn wait_for_listing(&self) -> Result<()> {
        self.wait_visible(&self.harvest.card_selector).await?;
        Ok(())
    }

    pub async fn harvest_products(&self) -> Result<HarvestReport> {
        let listing = CdpListingPage::new(self.page.clone(), self.harvest.card_selector.clone());
        let harvester = ScrollHarvester::with_clock(
            listing,
            self.harvest.clone(),
            self.poller.clock().clone(),
            self.poller.cancel_token().clone(),
        );
        Ok(harvester.harvest().await?)
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        self.wait_visible(selector)
            .await?
            .click()
            .await?
            .type_str(text)
            .await?;
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        let cancel = self.poller.cancel_token();
        tokio::select! {
            _ = cancel.cancelled() => bail!("cancelled while filters were settling"),
            _ = self.poller.clock().sleep(self.filter_settle) => Ok(()),
        }
    }

    /// Poll until `selector` matches an element with a non-empty layout box.
    async fn wait_visible(&self, selector: &str) -> Result<Element> {
        let page = &self.page;
        let outcome = self
            .poller
            .until(self.harvest.default_timeout, move || async move {
                let Ok(element) = page.find_element(selector).await else {
                    return Ok::<_, anyhow::Error>(None);
                };
                match element.bounding_box().await {
                    Ok(b) if b.width > 0.0 && b.height > 0.0 => Ok(Some(element)),
                    _ => Ok(None),
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(element) => Ok(element),
            PollOutcome::TimedOut => bail!(
                "element {} not visible after {}s",
                selector,
                self.harvest.default_timeout.as_secs()
            ),
            PollOutcome::Cancelled => bail!("cancelled while waiting for {}", selector),
        }
    }
}
