use crate::core::config::DEFAULT_BOTTOM_TOLERANCE_PX;
use crate::core::types::ViewportSample;

/// Decides whether the viewport sits at (or within `tolerance_px` of) the end
/// of the document.
///
/// The tolerance absorbs sub-pixel rounding and late layout reflow. A single
/// verdict is advisory: [`super::StabilizationWaiter`] re-samples before
/// anything acts on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BottomDetector {
    tolerance_px: f64,
}

impl BottomDetector {
    pub fn new(tolerance_px: f64) -> Self {
        Self { tolerance_px }
    }

    pub fn is_near_bottom(&self, sample: &ViewportSample) -> bool {
        sample.visible_bottom() >= sample.document_height - self.tolerance_px
    }
}

impl Default for BottomDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BOTTOM_TOLERANCE_PX)
    }
}
