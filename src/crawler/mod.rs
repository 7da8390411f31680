//! Crawler module for board listing and thread fetching
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with jitter, retries and back-off
//! - The bounded worker pool driving both crawl phases
//! - Overall crawl coordination

mod backoff;
mod coordinator;
mod fetcher;

pub use backoff::{Backoff, DelayRange};
pub use coordinator::{run_crawl, CrawlReport, Crawler};
pub use fetcher::{build_http_client, FetchFailure, FetchRequest, FetchResult, Fetcher};

use crate::config::Config;
use crate::session::Credentials;
use crate::SweepError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the HTTP client and extractors
/// 2. Fetch and parse every index page
/// 3. Sort the listed threads newest first
/// 4. Fetch the content of every listed thread
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `credentials` - Session cookies and proxy
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed, possibly with per-item failures
/// * `Err(SweepError)` - Setup failed or no thread was listed
pub async fn crawl(config: Config, credentials: Credentials) -> Result<CrawlReport, SweepError> {
    run_crawl(config, credentials).await
}
