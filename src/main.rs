//! Forum-Sweep main entry point
//!
//! This is the command-line interface for the Forum-Sweep section harvester.

use anyhow::Context;
use clap::Parser;
use forum_sweep::config::{load_config_with_hash, validate, Config};
use forum_sweep::output::{print_statistics, write_records};
use forum_sweep::url::BoardUrls;
use forum_sweep::{Crawler, Credentials};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Forum-Sweep: A polite forum section harvester
///
/// Forum-Sweep lists the threads of one board section across its index
/// pages, fetches the first page of every thread with a bounded pool of
/// workers, and writes the records newest first.
#[derive(Parser, Debug)]
#[command(name = "forum-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A polite forum section harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Number of index pages to scan (overrides [board] pages)
    #[arg(long, value_name = "N")]
    pages: Option<u32>,

    /// Number of concurrent workers (overrides [crawler] workers)
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Output file (overrides [output] path)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// JSON cookie dump to load (overrides [session] cookie-file)
    #[arg(long, value_name = "PATH")]
    cookie_file: Option<PathBuf>,

    /// Validate config and show what would be fetched without fetching
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(pages) = self.pages {
            config.board.pages = pages;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(cookie_file) = &self.cookie_file {
            config.session.cookie_file = Some(cookie_file.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid command-line override")?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_sweep=info,warn"),
            1 => EnvFilter::new("forum_sweep=debug,info"),
            2 => EnvFilter::new("forum_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let urls = BoardUrls::new(&config.board.base_url, config.board.fid)
        .context("Invalid board base URL")?;
    let credentials =
        Credentials::from_config(&config.session).context("Failed to load session cookies")?;

    println!("=== Forum-Sweep Dry Run ===\n");

    println!("Board:");
    println!("  Base URL: {}", config.board.base_url);
    println!("  Section id: {}", urls.fid());
    println!("  Index pages: {}", config.board.pages);
    println!("  Encoding: {}", config.board.encoding);
    println!("  UTC offset: {:+}h", config.board.utc_offset_hours);

    println!("\nCrawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Delay before each fetch: {}-{}ms",
        config.crawler.min_delay_ms, config.crawler.max_delay_ms
    );
    println!("  Attempts per page: {}", config.crawler.retries);
    println!(
        "  Back-off: {}ms base, {}ms cap",
        config.crawler.retry_backoff_ms, config.crawler.max_backoff_ms
    );
    println!("  Timeout: {}s", config.crawler.timeout_secs);

    println!("\nSession:");
    println!("  Cookies: {}", credentials.cookies().len());
    for name in credentials.cookies().keys() {
        println!("    * {}", name);
    }
    println!("  Proxy: {}", credentials.proxy().unwrap_or("none"));
    println!("  User agents: {}", config.headers.user_agents.len());

    println!("\nOutput:");
    println!("  Path: {}", config.output.path.display());
    println!("  Format: {:?}", config.output.format);

    println!("\nIndex pages ({}):", config.board.pages);
    for page in 1..=config.board.pages {
        println!("  - {}", urls.listing(page));
    }

    println!("\n✓ Configuration is valid");
    if credentials.is_empty() {
        println!("! No session cookies: the board will likely reject requests");
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let credentials =
        Credentials::from_config(&config.session).context("Failed to load session cookies")?;
    let output_path = config.output.path.clone();
    let output_format = config.output.format;

    tracing::info!(
        "Board {} at {}: {} index pages, {} workers",
        config.board.fid,
        config.board.base_url,
        config.board.pages,
        config.crawler.workers
    );

    let crawler = Crawler::new(config, credentials).context("Failed to set up crawler")?;
    let now = crawler.board_now();

    // Run the crawler
    let report = match crawler.run(now).await {
        Ok(report) => {
            tracing::info!("Crawl completed successfully");
            report
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    write_records(&output_path, output_format, &report.records)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    print_statistics(&report.stats);
    println!(
        "✓ {} threads written to {}",
        report.records.len(),
        output_path.display()
    );

    if report.stats.is_degraded() {
        tracing::warn!("Some pages or threads could not be collected; see statistics above");
    }

    Ok(())
}
