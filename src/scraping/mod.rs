pub mod browser_manager;
pub mod cdp_page;

pub use browser_manager::{wait_until_ready, BrowserSession};
pub use cdp_page::{CdpCard, CdpListingPage};
