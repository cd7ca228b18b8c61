use serde::{Deserialize, Serialize};

/// Title substituted for cards that never produced usable data.
pub const DEFECTIVE_CARD_TITLE: &str = "defective card";

/// Scroll position, viewport height and document height at one moment.
///
/// The page keeps rendering while it is measured, so a single sample is
/// advisory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSample {
    pub scroll_offset_y: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ViewportSample {
    pub fn new(scroll_offset_y: f64, viewport_height: f64, document_height: f64) -> Self {
        Self {
            scroll_offset_y,
            viewport_height,
            document_height,
        }
    }

    /// Y coordinate of the lower edge of the viewport.
    pub fn visible_bottom(&self) -> f64 {
        self.scroll_offset_y + self.viewport_height
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestedItem {
    pub title: String,
    pub price: u64,
    /// Set for rendering artifacts and cards whose title never showed up.
    #[serde(default)]
    pub defective: bool,
}

impl HarvestedItem {
    pub fn new(title: impl Into<String>, price: u64) -> Self {
        Self {
            title: title.into(),
            price,
            defective: false,
        }
    }

    /// Placeholder for a card with no usable link.
    pub fn defective() -> Self {
        Self::untitled(0)
    }

    /// A real card whose title never rendered; the price is still kept.
    pub fn untitled(price: u64) -> Self {
        Self {
            title: DEFECTIVE_CARD_TITLE.to_string(),
            price,
            defective: true,
        }
    }

    /// Carried as a flag, so a product that is really titled
    /// "defective card" is not counted here.
    pub fn is_defective(&self) -> bool {
        self.defective
    }
}

/// Why the harvest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Bottom reached and the listing did not grow within the stabilization deadline.
    Confirmed,
    /// `max_iterations` exhausted before the listing was confirmed finished.
    IterationLimit,
    /// The cancellation token fired.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub items: Vec<HarvestedItem>,
    pub accepted_count: usize,
    pub duplicate_count: usize,
    pub stabilization_waits: usize,
    pub iterations: usize,
    pub scroll_nudges: usize,
    pub termination: Termination,
    pub started_at: String,
    pub finished_at: String,
}

impl HarvestReport {
    pub fn defective_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_defective()).count()
    }
}
