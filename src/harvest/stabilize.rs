use super::bottom::BottomDetector;
use super::clock::{PollOutcome, Poller};
use super::ListingPage;
use crate::core::error::PageError;
use std::time::Duration;
use tracing::{debug, info};

/// Tells "listing finished" apart from "listing paused mid-load".
///
/// Called once the detector first reports bottom. Re-samples the viewport on
/// every poll tick: the first sample that is no longer near the bottom means
/// the page grew; a deadline spent entirely at the bottom means it ended.
pub struct StabilizationWaiter<'a, P> {
    page: &'a P,
    detector: BottomDetector,
    poller: Poller,
}

impl<'a, P: ListingPage> StabilizationWaiter<'a, P> {
    pub fn new(page: &'a P, detector: BottomDetector, poller: Poller) -> Self {
        Self {
            page,
            detector,
            poller,
        }
    }

    /// `true` = confirmed end, `false` = content grew and harvesting should resume.
    ///
    /// Stale page state mid-poll counts as "not yet confirmed". A timeout is
    /// the terminal verdict, not an error. Cancellation also yields `true` so
    /// the caller stops; it checks the token itself to tell the two apart.
    pub async fn confirm_still_at_bottom(&self, deadline: Duration) -> Result<bool, PageError> {
        let page = self.page;
        let detector = self.detector;

        let outcome = self
            .poller
            .until(deadline, move || async move {
                match page.read_viewport_sample().await {
                    Ok(sample) if detector.is_near_bottom(&sample) => Ok(None),
                    Ok(sample) => Ok(Some(sample)),
                    Err(e) if e.is_stale() => {
                        debug!("stabilization: transient page state ({}), still polling", e);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        match outcome {
            PollOutcome::Ready(sample) => {
                info!(
                    document_height = sample.document_height,
                    "listing grew while waiting at the bottom, resuming"
                );
                Ok(false)
            }
            PollOutcome::TimedOut => {
                info!("no growth within {}ms, listing ended", deadline.as_millis());
                Ok(true)
            }
            PollOutcome::Cancelled => Ok(true),
        }
    }
}
