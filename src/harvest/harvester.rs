use super::bottom::BottomDetector;
use super::clock::{Clock, Poller, TokioClock};
use super::extract::{CardExtraction, CardExtractor};
use super::stabilize::StabilizationWaiter;
use super::ListingPage;
use crate::core::config::HarvestConfig;
use crate::core::error::HarvestError;
use crate::core::types::{HarvestReport, HarvestedItem, Termination};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bookkeeping for one harvest call.
///
/// Positions are visited strictly in order: the next index is always
/// `accepted_count() + duplicate_count()`, so every visited position is
/// either appended or counted as a duplicate, never skipped.
#[derive(Debug, Default, Clone)]
pub struct HarvestState {
    items: Vec<HarvestedItem>,
    duplicate_count: usize,
    seen_targets: HashSet<String>,
    iterations: usize,
    stabilization_waits: usize,
    scroll_nudges: usize,
}

impl HarvestState {
    pub fn items(&self) -> &[HarvestedItem] {
        &self.items
    }

    pub fn accepted_count(&self) -> usize {
        self.items.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_count
    }

    pub fn next_index(&self) -> usize {
        self.accepted_count() + self.duplicate_count
    }

    /// Record the card found at [`Self::next_index`]. Returns `true` if it was appended.
    ///
    /// Dedup is positional: a card whose target was already accepted is a
    /// recycled DOM slot and only advances the index. Extracted title and
    /// price are never compared. Defective cards have no target and are
    /// always appended.
    pub fn record(&mut self, extraction: CardExtraction) -> bool {
        if let Some(target) = extraction.target {
            if !self.seen_targets.insert(target) {
                self.duplicate_count += 1;
                return false;
            }
        }
        self.items.push(extraction.item);
        true
    }
}

pub struct ScrollHarvester<P> {
    page: P,
    config: HarvestConfig,
    detector: BottomDetector,
    extractor: CardExtractor,
    poller: Poller,
}

impl<P: ListingPage> ScrollHarvester<P> {
    pub fn new(page: P, config: HarvestConfig, cancel: CancellationToken) -> Self {
        Self::with_clock(page, config, Arc::new(TokioClock), cancel)
    }

    pub fn with_clock(
        page: P,
        config: HarvestConfig,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let poller = Poller::new(clock, config.poll_interval, cancel);
        let extractor = CardExtractor::new(
            config.card_locators.clone(),
            config.default_timeout,
            poller.clone(),
        );
        Self {
            page,
            detector: BottomDetector::new(config.bottom_tolerance_px),
            extractor,
            poller,
            config,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Scroll through the listing until it is confirmed finished.
    ///
    /// Cancellation and the iteration cap return what was collected so far;
    /// only collaborator failures and malformed prices are errors.
    pub async fn harvest(&self) -> Result<HarvestReport, HarvestError> {
        let started_at = Utc::now();
        let mut state = HarvestState::default();
        info!("🛒 harvest started (cards: {})", self.config.card_selector);

        let termination = loop {
            if self.poller.is_cancelled() {
                break Termination::Cancelled;
            }
            if let Some(max) = self.config.max_iterations {
                if state.iterations >= max {
                    warn!(
                        "harvest hit the iteration cap ({}) before the listing settled",
                        max
                    );
                    break Termination::IterationLimit;
                }
            }
            state.iterations += 1;

            let rendered_ahead = match self.step(&mut state).await {
                Ok(ahead) => ahead,
                Err(HarvestError::Cancelled) => break Termination::Cancelled,
                Err(e) => return Err(e),
            };
            // Cards already on the page come before any end-of-listing verdict.
            if rendered_ahead {
                continue;
            }

            if self.reached_end(&mut state).await? {
                if self.poller.is_cancelled() {
                    break Termination::Cancelled;
                }
                break Termination::Confirmed;
            }
        };

        info!(
            "harvest finished ({:?}): {} items accepted, {} duplicate positions, {} iterations",
            termination,
            state.accepted_count(),
            state.duplicate_count(),
            state.iterations
        );

        Ok(HarvestReport {
            accepted_count: state.accepted_count(),
            duplicate_count: state.duplicate_count,
            stabilization_waits: state.stabilization_waits,
            iterations: state.iterations,
            scroll_nudges: state.scroll_nudges,
            items: state.items,
            termination,
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
        })
    }

    /// One pass: query, then extract the next card or nudge the scroll.
    ///
    /// Returns `true` when more rendered-but-unvisited cards remain (or the
    /// pass has to be retried), so the bottom check must be skipped.
    async fn step(&self, state: &mut HarvestState) -> Result<bool, HarvestError> {
        let cards = match self.page.query_visible_items().await {
            Ok(cards) => cards,
            Err(e) if e.is_stale() => {
                debug!("card query hit a re-render ({}), retrying", e);
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        let index = state.next_index();
        let Some(card) = cards.get(index) else {
            debug!(
                index,
                visible = cards.len(),
                "next card not rendered yet, nudging scroll by {}px",
                self.config.scroll_step_px
            );
            match self.page.scroll_by(self.config.scroll_step_px).await {
                Ok(()) => state.scroll_nudges += 1,
                Err(e) if e.is_stale() => debug!("scroll nudge hit a re-render ({})", e),
                Err(e) => return Err(e.into()),
            }
            // A nudge can land on the bottom and render the next card in the
            // same move; only an unchanged range goes on to the bottom check.
            return match self.page.query_visible_items().await {
                Ok(after) => Ok(after.len() > index),
                Err(e) if e.is_stale() => Ok(true),
                Err(e) => Err(e.into()),
            };
        };

        if let Err(e) = self.page.scroll_into_view(card).await {
            if e.is_stale() {
                debug!(index, "card went stale before scrolling into view ({})", e);
                return Ok(true);
            }
            return Err(e.into());
        }

        let extraction = self.extractor.extract(card).await?;
        if state.record(extraction) {
            debug!(index, accepted = state.accepted_count(), "card accepted");
        } else {
            info!(
                "duplicate position at index {} (recycled DOM slot), {} so far",
                index,
                state.duplicate_count()
            );
        }

        Ok(state.next_index() < cards.len())
    }

    /// Bottom check, escalating to the stabilization wait when near the end.
    async fn reached_end(&self, state: &mut HarvestState) -> Result<bool, HarvestError> {
        let sample = match self.page.read_viewport_sample().await {
            Ok(sample) => sample,
            Err(e) if e.is_stale() => {
                debug!("viewport sample hit a re-render ({}), skipping bottom check", e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if !self.detector.is_near_bottom(&sample) {
            return Ok(false);
        }

        info!(
            accepted = state.accepted_count(),
            "reached the bottom of the listing, waiting for more content"
        );
        state.stabilization_waits += 1;
        let waiter = StabilizationWaiter::new(&self.page, self.detector, self.poller.clone());
        Ok(waiter
            .confirm_still_at_bottom(self.config.stabilization_timeout)
            .await?)
    }
}
