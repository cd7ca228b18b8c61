//! Scripted infinite-scroll listing for the harvest scenarios.
//!
//! Cards are `ITEM_HEIGHT` tall and stacked in document order; the viewport is
//! `VIEWPORT_HEIGHT` tall. Time comes from a shared `ManualClock` so growth
//! delays and stabilization deadlines run instantly.
#![allow(dead_code)]

use async_trait::async_trait;
use listing_harvest::core::config::{CardLocators, HarvestConfig};
use listing_harvest::harvest::{BottomDetector, CardHandle, ListingPage, ManualClock, ScrollHarvester};
use listing_harvest::{PageError, ViewportSample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ITEM_HEIGHT: f64 = 100.0;
pub const VIEWPORT_HEIGHT: f64 = 300.0;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Short deadlines so every scenario finishes in a handful of virtual seconds.
pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        default_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(100),
        stabilization_timeout: Duration::from_secs(1),
        ..HarvestConfig::default()
    }
}

pub fn harvester(
    listing: FakeListing,
    config: HarvestConfig,
    clock: &Arc<ManualClock>,
    cancel: CancellationToken,
) -> ScrollHarvester<FakeListing> {
    ScrollHarvester::with_clock(listing, config, clock.clone(), cancel)
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub link: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    /// Text reads answered with "nothing rendered" before the real text.
    render_after_reads: usize,
    /// Text reads answered with a stale reference before anything else.
    stale_reads: usize,
    /// Fired by the first text read, which then reports "nothing rendered".
    cancel_on_read: Option<CancellationToken>,
    text_reads: Arc<AtomicUsize>,
}

impl FakeItem {
    pub fn product(n: usize) -> Self {
        Self {
            link: Some(format!("/product/{}", n)),
            title: Some(format!("Product {}", n)),
            price: Some(format!("{}\u{a0}₽", 1000 + n)),
            render_after_reads: 0,
            stale_reads: 0,
            cancel_on_read: None,
            text_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn products(range: std::ops::Range<usize>) -> Vec<Self> {
        range.map(Self::product).collect()
    }

    /// A card with no link: a layout artifact between real products.
    pub fn artifact() -> Self {
        Self {
            link: None,
            title: Some("sponsored".to_string()),
            price: Some("1".to_string()),
            ..Self::product(0)
        }
    }

    pub fn with_price(mut self, price: &str) -> Self {
        self.price = Some(price.to_string());
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    pub fn without_price(mut self) -> Self {
        self.price = None;
        self
    }

    pub fn rendering_after(mut self, reads: usize) -> Self {
        self.render_after_reads = reads;
        self
    }

    pub fn stale_for(mut self, reads: usize) -> Self {
        self.stale_reads = reads;
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_read = Some(token);
        self
    }

    /// The same product occupying another DOM slot.
    pub fn recycled(&self) -> Self {
        Self {
            text_reads: Arc::new(AtomicUsize::new(0)),
            ..self.clone()
        }
    }
}

pub struct FakeCard {
    index: usize,
    item: FakeItem,
    locators: CardLocators,
}

impl FakeCard {
    fn text(&self, value: &Option<String>) -> Result<Option<String>, PageError> {
        let n = self.item.text_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.item.cancel_on_read {
            token.cancel();
            return Ok(None);
        }
        if n < self.item.stale_reads {
            return Err(PageError::StaleReference(format!("card {} detached", self.index)));
        }
        if n < self.item.stale_reads + self.item.render_after_reads {
            return Ok(None);
        }
        Ok(value.clone())
    }
}

#[async_trait]
impl CardHandle for FakeCard {
    async fn read_attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        if name == self.locators.link_attribute {
            Ok(self.item.link.clone())
        } else {
            Ok(None)
        }
    }

    async fn read_display_text(&self, locator: &str) -> Result<Option<String>, PageError> {
        if locator == self.locators.title {
            self.text(&self.item.title)
        } else if locator == self.locators.price {
            self.text(&self.item.price)
        } else {
            Ok(None)
        }
    }
}

struct Growth {
    after: Duration,
    add: usize,
}

struct Inner {
    items: Vec<FakeItem>,
    loaded: usize,
    growth: VecDeque<Growth>,
    /// Virtual time of the first bottom sample since the last growth.
    armed_at: Option<Duration>,
    offset: f64,
    render_ahead: Option<f64>,
    stale_queries: usize,
    stale_samples: usize,
    stale_scrolls: usize,
    viewport_failure: Option<PageError>,
    cancel_at_bottom: Option<CancellationToken>,
    viewport_reads: usize,
    nudges: Vec<i64>,
}

impl Inner {
    fn document_height(&self) -> f64 {
        (self.loaded as f64 * ITEM_HEIGHT).max(VIEWPORT_HEIGHT)
    }

    fn clamp(&self, offset: f64) -> f64 {
        offset.clamp(0.0, self.document_height() - VIEWPORT_HEIGHT)
    }
}

pub struct FakeListing {
    inner: Mutex<Inner>,
    clock: Arc<ManualClock>,
    locators: CardLocators,
}

impl FakeListing {
    pub fn new(clock: &Arc<ManualClock>, items: Vec<FakeItem>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                loaded: items.len(),
                items,
                growth: VecDeque::new(),
                armed_at: None,
                offset: 0.0,
                render_ahead: None,
                stale_queries: 0,
                stale_samples: 0,
                stale_scrolls: 0,
                viewport_failure: None,
                cancel_at_bottom: None,
                viewport_reads: 0,
                nudges: Vec::new(),
            }),
            clock: clock.clone(),
            locators: CardLocators::default(),
        }
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap()
    }

    pub fn initially_loaded(mut self, n: usize) -> Self {
        let inner = self.inner_mut();
        inner.loaded = n.min(inner.items.len());
        self
    }

    /// Append `add` more items once the page has sat at the bottom for `after`.
    pub fn grows_after(mut self, after: Duration, add: usize) -> Self {
        self.inner_mut().growth.push_back(Growth { after, add });
        self
    }

    /// Only cards whose top lies within `px` below the viewport are in the DOM.
    pub fn render_ahead(mut self, px: f64) -> Self {
        self.inner_mut().render_ahead = Some(px);
        self
    }

    pub fn stale_queries(mut self, n: usize) -> Self {
        self.inner_mut().stale_queries = n;
        self
    }

    /// The next `n` viewport samples fail as stale.
    pub fn stale_samples(mut self, n: usize) -> Self {
        self.inner_mut().stale_samples = n;
        self
    }

    /// The next `n` `scroll_into_view` calls fail as stale.
    pub fn stale_scroll_into_view(mut self, n: usize) -> Self {
        self.inner_mut().stale_scrolls = n;
        self
    }

    pub fn failing_viewport(mut self, err: PageError) -> Self {
        self.inner_mut().viewport_failure = Some(err);
        self
    }

    pub fn cancel_at_bottom(mut self, token: CancellationToken) -> Self {
        self.inner_mut().cancel_at_bottom = Some(token);
        self
    }

    pub fn viewport_reads(&self) -> usize {
        self.inner.lock().unwrap().viewport_reads
    }

    pub fn nudges(&self) -> Vec<i64> {
        self.inner.lock().unwrap().nudges.clone()
    }

    pub fn offset(&self) -> f64 {
        self.inner.lock().unwrap().offset
    }
}

#[async_trait]
impl ListingPage for FakeListing {
    type Card = FakeCard;

    async fn read_viewport_sample(&self) -> Result<ViewportSample, PageError> {
        let mut s = self.inner.lock().unwrap();
        s.viewport_reads += 1;
        if let Some(err) = &s.viewport_failure {
            return Err(err.clone());
        }
        if s.stale_samples > 0 {
            s.stale_samples -= 1;
            return Err(PageError::StaleReference("document swapped mid-read".to_string()));
        }

        let now = self.clock.elapsed();
        let due = match (s.armed_at, s.growth.front()) {
            (Some(armed), Some(g)) => now.saturating_sub(armed) >= g.after,
            _ => false,
        };
        if due {
            if let Some(g) = s.growth.pop_front() {
                s.loaded = (s.loaded + g.add).min(s.items.len());
                s.armed_at = None;
            }
        }

        let sample = ViewportSample::new(s.offset, VIEWPORT_HEIGHT, s.document_height());
        if BottomDetector::default().is_near_bottom(&sample) {
            if s.armed_at.is_none() && !s.growth.is_empty() {
                s.armed_at = Some(now);
            }
            if let Some(token) = &s.cancel_at_bottom {
                token.cancel();
            }
        }
        Ok(sample)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), PageError> {
        let mut s = self.inner.lock().unwrap();
        s.offset = s.clamp(s.offset + pixels as f64);
        s.nudges.push(pixels);
        Ok(())
    }

    async fn query_visible_items(&self) -> Result<Vec<FakeCard>, PageError> {
        let mut s = self.inner.lock().unwrap();
        if s.stale_queries > 0 {
            s.stale_queries -= 1;
            return Err(PageError::StaleReference("listing re-rendered".to_string()));
        }
        let limit = s.render_ahead.map(|ahead| s.offset + VIEWPORT_HEIGHT + ahead);
        Ok(s.items[..s.loaded]
            .iter()
            .enumerate()
            .filter(|(i, _)| limit.map_or(true, |l| (*i as f64) * ITEM_HEIGHT < l))
            .map(|(index, item)| FakeCard {
                index,
                item: item.clone(),
                locators: self.locators.clone(),
            })
            .collect())
    }

    async fn scroll_into_view(&self, card: &FakeCard) -> Result<(), PageError> {
        let mut s = self.inner.lock().unwrap();
        if s.stale_scrolls > 0 {
            s.stale_scrolls -= 1;
            return Err(PageError::StaleReference(format!("card {} detached", card.index)));
        }
        let top = card.index as f64 * ITEM_HEIGHT;
        let bottom = top + ITEM_HEIGHT;
        let target = if top < s.offset {
            top
        } else if bottom > s.offset + VIEWPORT_HEIGHT {
            bottom - VIEWPORT_HEIGHT
        } else {
            s.offset
        };
        s.offset = s.clamp(target);
        Ok(())
    }
}
