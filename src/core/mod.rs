pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, HarvestConfig};
pub use error::{HarvestError, PageError};
