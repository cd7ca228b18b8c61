//! `chromiumoxide` implementation of the harvest page traits.
//!
//! Every CDP failure is mapped onto [`PageError`] here so the harvest loop
//! never sees a browser-specific error type.

use crate::core::error::PageError;
use crate::core::types::ViewportSample;
use crate::harvest::{CardHandle, ListingPage};
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use serde::Deserialize;

/// Substrings Chrome uses when a node or execution context it was asked
/// about no longer exists. Anything else is a genuine protocol failure.
const STALE_MARKERS: &[&str] = &[
    "No node with given id",
    "Could not find node with given id",
    "Node is detached",
    "Cannot find context with specified id",
    "does not belong to the document",
    "Execution context was destroyed",
];

/// Sorts a raw CDP error message into stale / evaluation / protocol.
pub fn classify_message(message: &str) -> PageError {
    if STALE_MARKERS.iter().any(|m| message.contains(m)) {
        PageError::StaleReference(message.to_string())
    } else if message.contains("Uncaught") || message.contains("JavaScript") {
        PageError::Evaluation(message.to_string())
    } else {
        PageError::Protocol(message.to_string())
    }
}

pub fn classify_cdp_error(err: chromiumoxide::error::CdpError) -> PageError {
    classify_message(&err.to_string())
}

const VIEWPORT_SCRIPT: &str = "() => ({ \
    offset: window.pageYOffset, \
    viewport: window.innerHeight, \
    document: Math.max(document.body.scrollHeight, document.documentElement.scrollHeight) \
})";

#[derive(Deserialize)]
struct RawViewport {
    offset: f64,
    viewport: f64,
    document: f64,
}

/// A live tab showing an infinite-scroll listing.
#[derive(Debug, Clone)]
pub struct CdpListingPage {
    page: Page,
    card_selector: String,
}

impl CdpListingPage {
    pub fn new(page: Page, card_selector: impl Into<String>) -> Self {
        Self {
            page,
            card_selector: card_selector.into(),
        }
    }
}

#[async_trait]
impl ListingPage for CdpListingPage {
    type Card = CdpCard;

    async fn read_viewport_sample(&self) -> Result<ViewportSample, PageError> {
        let raw: RawViewport = self
            .page
            .evaluate(VIEWPORT_SCRIPT)
            .await
            .map_err(classify_cdp_error)?
            .into_value()
            .map_err(|e| PageError::Evaluation(format!("viewport script: {}", e)))?;
        Ok(ViewportSample::new(raw.offset, raw.viewport, raw.document))
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), PageError> {
        self.page
            .evaluate(format!(
                "window.scrollBy({{top: {}, behavior: 'instant'}});",
                pixels
            ))
            .await
            .map_err(classify_cdp_error)?;
        Ok(())
    }

    async fn query_visible_items(&self) -> Result<Vec<CdpCard>, PageError> {
        let elements = self
            .page
            .find_elements(self.card_selector.as_str())
            .await
            .map_err(classify_cdp_error)?;
        Ok(elements.into_iter().map(CdpCard::new).collect())
    }

    async fn scroll_into_view(&self, card: &CdpCard) -> Result<(), PageError> {
        card.element
            .scroll_into_view()
            .await
            .map_err(classify_cdp_error)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct CdpCard {
    element: Element,
}

impl CdpCard {
    pub fn new(element: Element) -> Self {
        Self { element }
    }
}

#[async_trait]
impl CardHandle for CdpCard {
    async fn read_attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        self.element
            .attribute(name)
            .await
            .map_err(classify_cdp_error)
    }

    async fn read_display_text(&self, locator: &str) -> Result<Option<String>, PageError> {
        // querySelector inside the card: a missing child is "not rendered yet",
        // not a dead node.
        let selector = serde_json::to_string(locator)
            .map_err(|e| PageError::Evaluation(format!("bad locator {}: {}", locator, e)))?;
        let returned = self
            .element
            .call_js_fn(
                format!(
                    "function() {{ const n = this.querySelector({}); return n ? n.innerText : null; }}",
                    selector
                ),
                false,
            )
            .await
            .map_err(classify_cdp_error)?;
        Ok(returned
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}
