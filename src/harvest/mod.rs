//! Incremental scroll-harvest protocol.
//!
//! `ScrollHarvester` drives the loop; `CardExtractor`, `BottomDetector` and
//! `StabilizationWaiter` are the pieces it consults. The browser is reached
//! only through [`ListingPage`] and [`CardHandle`], so the whole protocol can
//! run against a scripted page in tests.

pub mod bottom;
pub mod clock;
pub mod extract;
pub mod harvester;
pub mod stabilize;

pub use bottom::BottomDetector;
pub use clock::{Clock, ManualClock, PollOutcome, Poller, TokioClock};
pub use extract::{clean_price_text, parse_price, CardExtraction, CardExtractor};
pub use harvester::{HarvestState, ScrollHarvester};
pub use stabilize::StabilizationWaiter;

use crate::core::error::PageError;
use crate::core::types::ViewportSample;
use async_trait::async_trait;

/// One rendered listing card, borrowed from a DOM we do not own.
///
/// Both reads may legitimately return `None` while the card is still
/// rendering, and `PageError::StaleReference` once the node was replaced.
#[async_trait]
pub trait CardHandle: Send + Sync {
    async fn read_attribute(&self, name: &str) -> Result<Option<String>, PageError>;

    /// Displayed text of the first element matching `locator` inside the card.
    async fn read_display_text(&self, locator: &str) -> Result<Option<String>, PageError>;
}

/// The page/session capabilities the harvester needs. Implementations must
/// serialize their own side effects; the harvester never calls them
/// concurrently.
#[async_trait]
pub trait ListingPage: Send + Sync {
    type Card: CardHandle;

    async fn read_viewport_sample(&self) -> Result<ViewportSample, PageError>;

    async fn scroll_by(&self, pixels: i64) -> Result<(), PageError>;

    /// Card handles in document order. The list may grow between calls.
    async fn query_visible_items(&self) -> Result<Vec<Self::Card>, PageError>;

    async fn scroll_into_view(&self, card: &Self::Card) -> Result<(), PageError>;
}
