use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use listing_harvest::core::config::load_app_config;
use listing_harvest::scraping::browser_manager::find_chrome_executable;
use listing_harvest::scraping::BrowserSession;
use listing_harvest::{HarvestReport, MarketPage};

const USAGE: &str = "\
listing-harvest: scroll an infinite product listing and print every card as JSON

USAGE:
    listing-harvest [OPTIONS]

OPTIONS:
    --url <URL>                 Start page (default: config market.url / MARKET_URL)
    --query <TEXT>              Search for TEXT before harvesting
    --category <NAME>           Catalog category to hover
    --subcategory <NAME>        Catalog subcategory to open
    --price-min <N>             Lower price filter
    --price-max <N>             Upper price filter
    --brand <NAME>              Brand filter, repeatable
    --max-iterations <N>        Harvest loop cap, 0 = unbounded
    --headed                    Show the browser window
    --config <PATH>             Explicit listing-harvest.json
    --check                     Report browser discovery and exit
    -V, --version               Print version
    -h, --help                  Print this help";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    url: Option<String>,
    query: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    price_min: Option<u64>,
    price_max: Option<u64>,
    brands: Vec<String>,
    max_iterations: Option<usize>,
    headed: bool,
    config: Option<PathBuf>,
    check: bool,
    version: bool,
    help: bool,
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("{} expects a non-negative integer, got {:?}", flag, raw))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg, None),
        };

        match flag.as_str() {
            "--headed" => out.headed = true,
            "--check" => out.check = true,
            "-V" | "--version" => out.version = true,
            "-h" | "--help" => out.help = true,
            "--url" | "--query" | "--category" | "--subcategory" | "--price-min"
            | "--price-max" | "--brand" | "--max-iterations" | "--config" => {
                let value = match inline {
                    Some(v) => v,
                    None => args
                        .next()
                        .ok_or_else(|| anyhow!("{} requires a value", flag))?,
                };
                match flag.as_str() {
                    "--url" => out.url = Some(value),
                    "--query" => out.query = Some(value),
                    "--category" => out.category = Some(value),
                    "--subcategory" => out.subcategory = Some(value),
                    "--price-min" => out.price_min = Some(parse_number(&flag, &value)?),
                    "--price-max" => out.price_max = Some(parse_number(&flag, &value)?),
                    "--brand" => out.brands.push(value),
                    "--max-iterations" => {
                        out.max_iterations = Some(parse_number(&flag, &value)?)
                    }
                    _ => out.config = Some(PathBuf::from(value)),
                }
            }
            other => bail!("unknown argument {:?}\n\n{}", other, USAGE),
        }
    }
    Ok(out)
}

fn validate_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw).map_err(|e| anyhow!("invalid --url {:?}: {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => bail!("unsupported URL scheme {:?} (expected http or https)", other),
    }
}

async fn run(market: &MarketPage, args: &CliArgs, url: &str) -> Result<HarvestReport> {
    market.open(url).await?;

    if let Some(query) = &args.query {
        market.search(query).await?;
    }
    if args.category.is_some() || args.subcategory.is_some() {
        market.open_catalog().await?;
        if let Some(category) = &args.category {
            market.hover_category(category).await?;
        }
        if let Some(subcategory) = &args.subcategory {
            market.open_subcategory(subcategory).await?;
        }
    }
    if let Some(min) = args.price_min {
        market.set_price_min(min).await?;
    }
    if let Some(max) = args.price_max {
        market.set_price_max(max).await?;
    }
    if !args.brands.is_empty() {
        market.select_brands(args.brands.as_slice()).await?;
    }

    market.wait_for_listing().await?;
    market.harvest_products().await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the JSON report.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.version {
        println!("listing-harvest {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut cfg = load_app_config(args.config.as_deref());
    if let Some(n) = args.max_iterations {
        cfg.harvest.max_iterations = Some(n);
    }
    if args.headed {
        cfg.browser.headless = Some(false);
    }

    if args.check {
        let explicit = cfg.browser.chrome_executable_override();
        match find_chrome_executable(explicit.as_deref()) {
            Some(exe) => {
                println!("browser: {}", exe);
                return Ok(());
            }
            None => {
                eprintln!("browser: not found (install Chrome/Chromium or set CHROME_EXECUTABLE)");
                std::process::exit(2);
            }
        }
    }

    let url = validate_url(args.url.as_deref().unwrap_or(&cfg.market.resolve_url()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    let session = BrowserSession::launch(&cfg.browser).await?;
    let page = session.new_page("about:blank").await?;
    let market = MarketPage::from_config(page, &cfg, cancel);

    let result = run(&market, &args, &url).await;
    session.close().await;
    let report = result?;

    info!(
        "✅ {} items ({} defective), {} duplicate positions, termination: {:?}",
        report.accepted_count,
        report.defective_count(),
        report.duplicate_count,
        report.termination
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
