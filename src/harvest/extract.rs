use super::clock::{PollOutcome, Poller};
use super::CardHandle;
use crate::core::config::CardLocators;
use crate::core::error::{HarvestError, PageError};
use crate::core::types::HarvestedItem;
use std::time::Duration;
use tracing::{debug, warn};

/// Strip a displayed price down to its ASCII digits.
///
/// Thousands separators on listing sites are usually no-break or narrow
/// spaces (U+00A0, U+2009, U+202F); they go along with currency signs and
/// other non-digits. Idempotent.
pub fn clean_price_text(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Parse a displayed price.
///
/// `Ok(None)` when no digits are present yet (still rendering). Digits that
/// do not fit a `u64` are a hard error.
pub fn parse_price(text: &str) -> Result<Option<u64>, HarvestError> {
    let digits = clean_price_text(text);
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|e| HarvestError::MalformedPrice {
            text: text.to_string(),
            reason: e.to_string(),
        })
}

/// Result of reading one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardExtraction {
    /// Outbound link of the card; `None` for defective cards.
    pub target: Option<String>,
    pub item: HarvestedItem,
}

impl CardExtraction {
    pub fn defective() -> Self {
        Self {
            target: None,
            item: HarvestedItem::defective(),
        }
    }

    pub fn is_defective(&self) -> bool {
        self.target.is_none()
    }
}

/// Reads title and price from a card that may not have rendered yet.
#[derive(Debug, Clone)]
pub struct CardExtractor {
    locators: CardLocators,
    timeout: Duration,
    poller: Poller,
}

fn stale_as_pending<T>(result: Result<Option<T>, PageError>) -> Result<Option<T>, HarvestError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_stale() => {
            debug!("card re-rendered mid-read ({}), retrying", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

impl CardExtractor {
    pub fn new(locators: CardLocators, timeout: Duration, poller: Poller) -> Self {
        Self {
            locators,
            timeout,
            poller,
        }
    }

    /// Full extraction: target check first, then title and price.
    ///
    /// A card without a usable target is a rendering artifact. It yields the
    /// sentinel item straight away without polling its fields.
    pub async fn extract<C: CardHandle>(&self, card: &C) -> Result<CardExtraction, HarvestError> {
        let Some(target) = self.read_target(card).await? else {
            warn!("defective card: no '{}' attribute", self.locators.link_attribute);
            return Ok(CardExtraction::defective());
        };

        let title = self.extract_title(card).await?;
        let price = self.extract_price(card).await?;
        let item = match title {
            Some(title) => HarvestedItem::new(title, price),
            None => HarvestedItem::untitled(price),
        };
        Ok(CardExtraction {
            target: Some(target),
            item,
        })
    }

    /// The card's link attribute, trimmed. Staleness is retried up to the
    /// field deadline; a card that stays stale is treated as defective.
    async fn read_target<C: CardHandle>(&self, card: &C) -> Result<Option<String>, HarvestError> {
        let attribute = self.locators.link_attribute.as_str();
        let outcome = self
            .poller
            .until(self.timeout, move || async move {
                match card.read_attribute(attribute).await {
                    Ok(value) => Ok(Some(
                        value
                            .map(|v| v.trim().to_string())
                            .filter(|v| !v.is_empty()),
                    )),
                    Err(e) => stale_as_pending(Err(e)),
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(target) => Ok(target),
            PollOutcome::TimedOut => {
                warn!("card stayed stale for {}ms while reading its target", self.timeout.as_millis());
                Ok(None)
            }
            PollOutcome::Cancelled => Err(HarvestError::Cancelled),
        }
    }

    /// Poll the title until it is non-empty; `None` once the deadline passes.
    pub async fn extract_title<C: CardHandle>(&self, card: &C) -> Result<Option<String>, HarvestError> {
        let locator = self.locators.title.as_str();
        let outcome = self
            .poller
            .until(self.timeout, move || async move {
                let text = stale_as_pending(card.read_display_text(locator).await)?;
                Ok::<_, HarvestError>(
                    text.map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty()),
                )
            })
            .await?;

        match outcome {
            PollOutcome::Ready(title) => Ok(Some(title)),
            PollOutcome::TimedOut => {
                warn!("[WAIT] card title stayed empty for {}ms", self.timeout.as_millis());
                Ok(None)
            }
            PollOutcome::Cancelled => Err(HarvestError::Cancelled),
        }
    }

    /// Poll the price until it contains a digit; `0` on timeout.
    pub async fn extract_price<C: CardHandle>(&self, card: &C) -> Result<u64, HarvestError> {
        let locator = self.locators.price.as_str();
        let outcome = self
            .poller
            .until(self.timeout, move || async move {
                match stale_as_pending(card.read_display_text(locator).await)? {
                    Some(text) => parse_price(&text),
                    None => Ok(None),
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(price) => Ok(price),
            PollOutcome::TimedOut => {
                warn!("[WAIT] card price stayed empty for {}ms", self.timeout.as_millis());
                Ok(0)
            }
            PollOutcome::Cancelled => Err(HarvestError::Cancelled),
        }
    }
}
