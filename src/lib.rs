pub mod core;
pub mod harvest;
pub mod market;
pub mod scraping;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{AppConfig, HarvestConfig, HarvestError, PageError};

pub use harvest::{CardHandle, ListingPage, ScrollHarvester};
pub use market::MarketPage;
