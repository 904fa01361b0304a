//! order-loadgen
//!
//! Constant-rate load test for the fulfillment order-creation API.
//! Exits non-zero when setup fails or any threshold is missed.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_loadgen::{
    Catalog, ConfigOverrides, HttpSubmitter, LoadTest, LoadTestConfig, LoadTestReport,
};

/// Order creation load generator
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// TOML config file
    #[arg(long, env = "LOADGEN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// API base URL
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Product catalog JSON file
    #[arg(long, env = "PRODUCT_CATALOG_PATH")]
    catalog_path: Option<String>,

    /// Download the catalog from this URL instead of reading a file
    #[arg(long, env = "PRODUCT_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Run length, e.g. 90, 30s, 5m, "1h 30m"
    #[arg(long, env = "TEST_DURATION")]
    duration: Option<String>,

    /// Arrivals per second
    #[arg(long)]
    rate: Option<f64>,

    #[arg(long)]
    min_workers: Option<usize>,

    #[arg(long)]
    max_workers: Option<usize>,

    /// Seed for reproducible payloads
    #[arg(long, env = "LOADGEN_SEED")]
    seed: Option<u64>,

    /// Where to write the JSON summary
    #[arg(long)]
    summary_path: Option<String>,

    /// Skip writing the JSON summary
    #[arg(long)]
    no_summary: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOADGEN_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> Result<LoadTestConfig> {
        let mut config = match &self.config {
            Some(path) => LoadTestConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => LoadTestConfig::from_env(),
        };

        config.apply_overrides(ConfigOverrides {
            base_url: self.base_url,
            catalog_path: self.catalog_path,
            catalog_url: self.catalog_url,
            duration: self.duration,
            rate_per_sec: self.rate,
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            seed: self.seed,
            summary_path: self.summary_path,
            no_summary: self.no_summary,
        });
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.into_config()?;
    let endpoint = config.orders_endpoint();
    info!(
        endpoint = %endpoint,
        rate_per_sec = config.rate_per_sec,
        duration = %config.duration,
        "Order load test configured"
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let catalog = match &config.catalog_url {
        Some(url) => Catalog::fetch(&http, url).await?,
        None => Catalog::from_path(&config.catalog_path)?,
    };

    let submitter = Arc::new(HttpSubmitter::with_client(http, endpoint));
    let load_test = LoadTest::new(&config, Arc::new(catalog), submitter)?;

    let stop = load_test.stop_signal();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl-C received, stopping after in-flight requests");
                stop.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let summary = load_test.run().await;
    let report = LoadTestReport::new(&summary, &config.base_url, &config.thresholds);

    println!("{}", report.executive_summary());
    if let Some(path) = &config.summary_path {
        report.write_json(path)?;
    }

    if !report.passed() {
        error!("Load test thresholds failed");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "order_loadgen=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    let local = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if local.exists() {
        let _ = dotenv::from_path(&local);
    }
}
