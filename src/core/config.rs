use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// AppConfig: file-based config loader (listing-harvest.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "LISTING_HARVEST_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_STABILIZATION_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SCROLL_STEP_PX: i64 = 500;
pub const DEFAULT_BOTTOM_TOLERANCE_PX: f64 = 50.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
pub const DEFAULT_FILTER_SETTLE_MS: u64 = 2000;
pub const DEFAULT_MARKET_URL: &str = "https://market.yandex.ru";

/// Sub-locators read inside a single listing card.
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CardLocators {
    /// CSS selector of the title element inside a card.
    pub title: String,
    /// CSS selector of the current-price element inside a card.
    pub price: String,
    /// Attribute on the card holding its outbound link. Empty or missing
    /// means the card is a rendering artifact.
    pub link_attribute: String,
}

impl Default for CardLocators {
    fn default() -> Self {
        Self {
            title: "[data-auto='snippet-title']".to_string(),
            price: "[data-auto='snippet-price-current']".to_string(),
            link_attribute: "data-href".to_string(),
        }
    }
}

/// Resolved harvest tuning, handed to every component at construction.
#[derive(Clone, Debug)]
pub struct HarvestConfig {
    /// Deadline for each card field read.
    pub default_timeout: Duration,
    pub poll_interval: Duration,
    /// How long a bottom-of-page sample must hold before the listing counts as finished.
    pub stabilization_timeout: Duration,
    /// Manual nudge applied when the next index has not been rendered yet.
    pub scroll_step_px: i64,
    pub bottom_tolerance_px: f64,
    /// `None` disables the safety valve.
    pub max_iterations: Option<usize>,
    pub card_selector: String,
    pub card_locators: CardLocators,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stabilization_timeout: Duration::from_millis(DEFAULT_STABILIZATION_TIMEOUT_MS),
            scroll_step_px: DEFAULT_SCROLL_STEP_PX,
            bottom_tolerance_px: DEFAULT_BOTTOM_TOLERANCE_PX,
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            card_selector: "[data-auto='snippet']".to_string(),
            card_locators: CardLocators::default(),
        }
    }
}

/// `harvest` section of listing-harvest.json.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct HarvestSection {
    pub default_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub stabilization_timeout_ms: Option<u64>,
    pub scroll_step_px: Option<i64>,
    pub bottom_tolerance_px: Option<f64>,
    /// `0` disables the iteration cap.
    pub max_iterations: Option<usize>,
    pub card_selector: Option<String>,
    pub card_locators: Option<CardLocators>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl HarvestSection {
    /// Field deadline: JSON field → `HARVEST_DEFAULT_TIMEOUT_SECS` env var → 10 s.
    pub fn resolve_default_timeout(&self) -> Duration {
        let secs = self
            .default_timeout_secs
            .or_else(|| env_parse("HARVEST_DEFAULT_TIMEOUT_SECS"))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Poll tick: JSON field → `HARVEST_POLL_INTERVAL_MS` env var → 250 ms.
    /// Zero is bumped to 1 ms so a poll can never spin.
    pub fn resolve_poll_interval(&self) -> Duration {
        let ms = self
            .poll_interval_ms
            .or_else(|| env_parse("HARVEST_POLL_INTERVAL_MS"))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        Duration::from_millis(ms.max(1))
    }

    /// Stabilization deadline: JSON field → `HARVEST_STABILIZATION_TIMEOUT_MS` → 3000 ms.
    pub fn resolve_stabilization_timeout(&self) -> Duration {
        let ms = self
            .stabilization_timeout_ms
            .or_else(|| env_parse("HARVEST_STABILIZATION_TIMEOUT_MS"))
            .unwrap_or(DEFAULT_STABILIZATION_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// Scroll nudge: JSON field → `HARVEST_SCROLL_STEP_PX` → 500 px.
    pub fn resolve_scroll_step_px(&self) -> i64 {
        self.scroll_step_px
            .or_else(|| env_parse("HARVEST_SCROLL_STEP_PX"))
            .unwrap_or(DEFAULT_SCROLL_STEP_PX)
    }

    /// Bottom tolerance: JSON field → `HARVEST_BOTTOM_TOLERANCE_PX` → 50 px.
    pub fn resolve_bottom_tolerance_px(&self) -> f64 {
        self.bottom_tolerance_px
            .or_else(|| env_parse("HARVEST_BOTTOM_TOLERANCE_PX"))
            .unwrap_or(DEFAULT_BOTTOM_TOLERANCE_PX)
    }

    /// Iteration cap: JSON field → `HARVEST_MAX_ITERATIONS` → 10 000. `0` means unbounded.
    pub fn resolve_max_iterations(&self) -> Option<usize> {
        let n = self
            .max_iterations
            .or_else(|| env_parse("HARVEST_MAX_ITERATIONS"))
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        (n > 0).then_some(n)
    }

    pub fn resolve(&self) -> HarvestConfig {
        let defaults = HarvestConfig::default();
        HarvestConfig {
            default_timeout: self.resolve_default_timeout(),
            poll_interval: self.resolve_poll_interval(),
            stabilization_timeout: self.resolve_stabilization_timeout(),
            scroll_step_px: self.resolve_scroll_step_px(),
            bottom_tolerance_px: self.resolve_bottom_tolerance_px(),
            max_iterations: self.resolve_max_iterations(),
            card_selector: self
                .card_selector
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.card_selector),
            card_locators: self.card_locators.clone().unwrap_or(defaults.card_locators),
        }
    }
}

/// CSS locators for the page controls around the listing.
///
/// `{category}`, `{subcategory}` and `{brand}` are substituted before lookup.
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MarketLocators {
    pub search_input: String,
    pub catalog_button: String,
    pub catalog_category: String,
    pub catalog_subcategory: String,
    pub price_min: String,
    pub price_max: String,
    pub brand_checkbox: String,
}

impl Default for MarketLocators {
    fn default() -> Self {
        Self {
            search_input: "input#header-search".to_string(),
            catalog_button: "[data-zone-name='catalog'] button".to_string(),
            catalog_category: "[data-zone-name='category-link'][title='{category}']".to_string(),
            catalog_subcategory: "[data-zone-name='link'][title='{subcategory}']".to_string(),
            price_min: "[data-auto='filter-range-glprice'] input[name$='from']".to_string(),
            price_max: "[data-auto='filter-range-glprice'] input[name$='to']".to_string(),
            brand_checkbox: "[data-zone-name='filter-brand'] label[title='{brand}']".to_string(),
        }
    }
}

/// `market` section of listing-harvest.json.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct MarketSection {
    pub url: Option<String>,
    /// Pause after each filter click so the listing can re-render.
    pub filter_settle_ms: Option<u64>,
    pub locators: Option<MarketLocators>,
}

impl MarketSection {
    /// Start URL: JSON field → `MARKET_URL` env var → Yandex Market.
    pub fn resolve_url(&self) -> String {
        if let Some(u) = &self.url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("MARKET_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MARKET_URL.to_string())
    }

    pub fn resolve_filter_settle(&self) -> Duration {
        let ms = self
            .filter_settle_ms
            .or_else(|| env_parse("MARKET_FILTER_SETTLE_MS"))
            .unwrap_or(DEFAULT_FILTER_SETTLE_MS);
        Duration::from_millis(ms)
    }

    pub fn resolve_locators(&self) -> MarketLocators {
        self.locators.clone().unwrap_or_default()
    }
}

/// `browser` section of listing-harvest.json.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrowserSection {
    pub chrome_executable: Option<String>,
    pub headless: Option<bool>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    /// Sent instead of the browser's own User-Agent when set.
    pub user_agent: Option<String>,
}

impl BrowserSection {
    /// Explicit browser binary: JSON field → `CHROME_EXECUTABLE` env var.
    /// Only returned when the path exists; otherwise auto-discovery applies.
    pub fn chrome_executable_override(&self) -> Option<String> {
        let p = self
            .chrome_executable
            .clone()
            .or_else(|| std::env::var(ENV_CHROME_EXECUTABLE).ok())?;
        let p = p.trim();
        if !p.is_empty() && Path::new(p).exists() {
            Some(p.to_string())
        } else {
            None
        }
    }

    pub fn resolve_headless(&self) -> bool {
        self.headless.unwrap_or(true)
    }

    pub fn resolve_window(&self) -> (u32, u32) {
        (
            self.window_width.unwrap_or(1920),
            self.window_height.unwrap_or(1080),
        )
    }

    pub fn resolve_user_agent(&self) -> Option<&str> {
        self.user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
    }
}

/// Top-level config loaded from `listing-harvest.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestSection,
    pub market: MarketSection,
    pub browser: BrowserSection,
}

fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Some(p) = explicit {
        v.push(p.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        v.push(PathBuf::from(env_path));
    }
    v.push(PathBuf::from("listing-harvest.json"));
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".listing-harvest").join("config.json"));
    }
    v
}

/// Load `listing-harvest.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `explicit` path (CLI `--config`)
/// 2. `LISTING_HARVEST_CONFIG` env var path
/// 3. `./listing-harvest.json`
/// 4. `~/.listing-harvest/config.json`
///
/// Missing file → `AppConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `AppConfig::default()`.
pub fn load_app_config(explicit: Option<&Path>) -> AppConfig {
    for path in config_candidates(explicit) {
        match std::fs::read_to_string(&path) {
            Ok(contents) => return parse_app_config(&contents, &path),
            Err(_) => continue,
        }
    }
    AppConfig::default()
}

fn parse_app_config(contents: &str, path: &Path) -> AppConfig {
    match serde_json::from_str::<AppConfig>(contents) {
        Ok(cfg) => {
            tracing::info!("listing-harvest config loaded from {}", path.display());
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "listing-harvest config parse error at {}: {}, using defaults",
                path.display(),
                e
            );
            AppConfig::default()
        }
    }
}
