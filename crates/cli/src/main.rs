// ABOUTME: Command-line entry point for Wist: one-shot product scrapes or the HTTP job service.
// ABOUTME: Every flag can also come from a WIST_* environment variable or a .env file.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wist_scraper::{
    load_profiles_file, BlockPolicy, Orchestrator, OrchestratorBuilder, ProductRecord,
    ScrapeRequest,
};

#[derive(Parser, Debug)]
#[command(name = "wist")]
#[command(about = "Extract product data from e-commerce pages, escalating to a headless browser when blocked")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one or more product URLs and print the results
    Scrape {
        /// Product page URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print full records as JSON instead of a summary line per URL
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP job service
    Serve {
        #[arg(long, env = "WIST_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(long, env = "WIST_PORT", default_value_t = 3001)]
        port: u16,
    },
}

/// Settings shared by both subcommands.
#[derive(Args, Debug)]
struct Config {
    /// Never escalate to the headless browser
    #[arg(long, global = true, env = "WIST_NO_HEAVY")]
    no_heavy: bool,

    /// Path to the Chrome or Chromium binary
    #[arg(long, global = true, env = "WIST_CHROME")]
    chrome: Option<PathBuf>,

    /// Allow fetching from private/local networks
    #[arg(long, global = true, env = "WIST_ALLOW_PRIVATE_NETWORKS")]
    allow_private_networks: bool,

    /// JSON file replacing the built-in block policy
    #[arg(long, global = true, env = "WIST_POLICY")]
    policy: Option<PathBuf>,

    /// JSON file replacing the built-in site profiles
    #[arg(long, global = true, env = "WIST_SITE_PROFILES")]
    site_profiles: Option<PathBuf>,

    /// Wall-clock budget for one job, in seconds
    #[arg(long, global = true, env = "WIST_PIPELINE_TIMEOUT", default_value_t = 60)]
    pipeline_timeout: u64,

    /// How long a synchronous scrape waits before giving up, in seconds
    #[arg(long, global = true, env = "WIST_SYNC_WAIT", default_value_t = 30)]
    sync_wait: u64,

    /// Cached records younger than this are served without fetching, in seconds
    #[arg(long, global = true, env = "WIST_CACHE_TTL", default_value_t = 21_600)]
    cache_ttl: u64,
}

impl Config {
    fn orchestrator(&self) -> Result<Orchestrator> {
        let mut builder = OrchestratorBuilder::new()
            .heavy_enabled(!self.no_heavy)
            .allow_private_networks(self.allow_private_networks)
            .pipeline_timeout(Duration::from_secs(self.pipeline_timeout))
            .sync_wait(Duration::from_secs(self.sync_wait))
            .freshness_window(Duration::from_secs(self.cache_ttl));

        if let Some(path) = &self.chrome {
            builder = builder.chrome_executable(path);
        }
        if let Some(path) = &self.site_profiles {
            let profiles = load_profiles_file(path)
                .with_context(|| format!("loading site profiles from {}", path.display()))?;
            builder = builder.profiles(profiles);
        }
        if let Some(path) = &self.policy {
            let policy = BlockPolicy::from_file(path)
                .with_context(|| format!("loading block policy from {}", path.display()))?;
            builder = builder.policy(policy);
        }
        Ok(builder.build())
    }
}

fn summary_line(url: &str, record: &ProductRecord) -> String {
    let price = match (&record.price, &record.currency) {
        (Some(price), Some(currency)) => format!("{} {}", price, currency),
        (Some(price), None) => price.to_string(),
        _ => record.price_raw.clone().unwrap_or_else(|| "-".to_string()),
    };
    format!(
        "{}\t{}\t{}\t{}",
        url,
        record.extraction_method,
        record.title.as_deref().unwrap_or("-"),
        price
    )
}

async fn scrape(orchestrator: Orchestrator, urls: &[String], json: bool) -> Result<bool> {
    let mut records = Vec::new();
    let mut had_error = false;
    info!(count = urls.len(), "scraping");

    for url in urls {
        match orchestrator.scrape_sync(ScrapeRequest::new(url), None).await {
            Ok(record) => {
                info!(url = %url, method = %record.extraction_method, "scraped");
                if !json {
                    println!("{}", summary_line(url, &record));
                }
                records.push(record);
            }
            Err(e) => {
                eprintln!("error scraping {}: {}", url, e.detail());
                had_error = true;
            }
        }
    }

    if json && !records.is_empty() {
        let output = if records.len() == 1 {
            serde_json::to_string_pretty(&records[0])?
        } else {
            serde_json::to_string_pretty(&records)?
        };
        println!("{}", output);
    }

    Ok(!had_error)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wist=info,wist_scraper=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let orchestrator = match cli.config.orchestrator() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = match cli.command {
        Command::Scrape { urls, json } => scrape(orchestrator, &urls, json).await,
        Command::Serve { host, port } => {
            let addr = SocketAddr::new(host, port);
            info!(%addr, "starting wist service");
            let served = wist_scraper::server::serve(orchestrator, addr).await;
            info!("wist service stopped");
            served.map(|_| true)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
