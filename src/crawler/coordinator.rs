//! Crawler coordinator - main crawl orchestration logic
//!
//! A crawl runs in two phases separated by a hard barrier:
//! 1. Listing: every index page is fetched and parsed by a bounded pool of
//!    workers; the summaries are merged and sorted newest first
//! 2. Content: every listed thread's first page is fetched by the same
//!    bounded pool and its post bodies are written into its record
//!
//! Workers never share mutable state. Each sends its outcome on a channel
//! and the coordinator's collector loop owns the accumulated results.

use crate::config::Config;
use crate::crawler::fetcher::{FetchRequest, FetchResult, Fetcher};
use crate::extract::{ContentExtractor, DateNormalizer, ListingExtractor, ListingOutcome};
use crate::output::CrawlStats;
use crate::record::{sort_newest_first, ThreadRecord, ThreadSummary, CONTENT_FETCH_FAILED};
use crate::session::Credentials;
use crate::url::BoardUrls;
use crate::SweepError;
use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

/// Finished crawl: records newest first plus failure counters
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub records: Vec<ThreadRecord>,
    pub stats: CrawlStats,
}

/// What a listing worker reports for one index page
#[derive(Debug)]
struct PageOutcome {
    page: u32,
    url: String,
    fetch: FetchSummary,
    listing: Option<ListingOutcome>,
}

/// What a content worker reports for one thread
#[derive(Debug)]
struct ContentOutcome {
    index: usize,
    fetch: FetchSummary,
    content: Option<String>,
}

/// The parts of a `FetchResult` the collector cares about once the body is consumed
#[derive(Debug, Clone, Copy)]
struct FetchSummary {
    forbidden: bool,
    attempts: u32,
}

impl From<&FetchResult> for FetchSummary {
    fn from(result: &FetchResult) -> Self {
        Self {
            forbidden: result.is_forbidden(),
            attempts: result.attempts(),
        }
    }
}

/// Main crawler structure
///
/// Everything a worker touches is shared read-only: configuration,
/// credentials, the HTTP client and the extractors.
pub struct Crawler {
    config: Arc<Config>,
    credentials: Arc<Credentials>,
    fetcher: Arc<Fetcher>,
    listing: Arc<ListingExtractor>,
    content: Arc<ContentExtractor>,
    urls: BoardUrls,
    normalizer: DateNormalizer,
}

impl Crawler {
    /// Creates a new crawler
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `credentials` - Session cookies and proxy, fixed for the whole crawl
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to run
    /// * `Err(SweepError)` - Invalid base URL, encoding or proxy
    pub fn new(config: Config, credentials: Credentials) -> Result<Self, SweepError> {
        let urls = BoardUrls::new(&config.board.base_url, config.board.fid)?;
        let offset = config.board.utc_offset().ok_or_else(|| {
            SweepError::Config(crate::ConfigError::Validation(format!(
                "utc-offset-hours out of range: {}",
                config.board.utc_offset_hours
            )))
        })?;
        let normalizer = DateNormalizer::new(offset);

        let fetcher = Fetcher::new(&config, &credentials, urls.board())?;
        let listing = ListingExtractor::new(urls.clone(), normalizer)?;
        let content = ContentExtractor::new()?;

        Ok(Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            fetcher: Arc::new(fetcher),
            listing: Arc::new(listing),
            content: Arc::new(content),
            urls,
            normalizer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn urls(&self) -> &BoardUrls {
        &self.urls
    }

    /// The current wall-clock time on the board
    pub fn board_now(&self) -> NaiveDateTime {
        Utc::now()
            .with_timezone(&self.normalizer.offset())
            .naive_local()
    }

    fn workers(&self) -> usize {
        self.config.crawler.workers.max(1) as usize
    }

    /// Runs both phases
    ///
    /// `now` anchors relative post dates (`昨天 10:00`, `10:00`).
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Records sorted newest first, contents filled in
    /// * `Err(SweepError::NoData)` - No index page yielded a single thread
    pub async fn run(&self, now: NaiveDateTime) -> Result<CrawlReport, SweepError> {
        let mut stats = CrawlStats::default();

        tracing::info!(
            "Listing {} index pages of board {} with {} workers",
            self.config.board.pages,
            self.urls.fid(),
            self.workers()
        );
        let started = Instant::now();
        let mut summaries = self.list_threads(now, &mut stats).await;
        stats.listing_elapsed = started.elapsed();

        if summaries.is_empty() {
            tracing::error!(
                "No threads listed ({} of {} index pages failed)",
                stats.pages_failed,
                stats.pages_attempted
            );
            return Err(SweepError::NoData {
                pages_attempted: stats.pages_attempted,
                pages_failed: stats.pages_failed,
            });
        }

        sort_newest_first(&mut summaries);
        stats.threads_listed = summaries.len();
        tracing::info!("Listing complete: {} threads", summaries.len());

        let mut records: Vec<ThreadRecord> = summaries.into_iter().map(ThreadRecord::from).collect();

        tracing::info!("Fetching content of {} threads", records.len());
        let started = Instant::now();
        self.fetch_contents(&mut records, &mut stats).await;
        stats.content_elapsed = started.elapsed();

        if stats.forbidden_failures > 0 {
            tracing::warn!(
                "{} requests ended on 403 Forbidden; session cookies have probably expired",
                stats.forbidden_failures
            );
        }

        tracing::info!(
            "Crawl complete: {} threads, {} without content",
            records.len(),
            stats.threads_failed
        );

        Ok(CrawlReport { records, stats })
    }

    /// Phase 1: fetches and parses every index page
    ///
    /// Summaries come back in encounter order: by page number, then by row
    /// order within the page, regardless of which worker finished first.
    pub async fn list_threads(
        &self,
        now: NaiveDateTime,
        stats: &mut CrawlStats,
    ) -> Vec<ThreadSummary> {
        let pages = self.config.board.pages;
        let semaphore = Arc::new(Semaphore::new(self.workers()));
        let (tx, mut rx) = mpsc::channel::<PageOutcome>(self.workers());

        for page in 1..=pages {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let credentials = Arc::clone(&self.credentials);
            let listing = Arc::clone(&self.listing);
            let request = FetchRequest::new(self.urls.listing(page), self.config.crawler.retries);

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let result = fetcher.fetch(&credentials, &request).await;
                let fetch = FetchSummary::from(&result);
                let listing = result.into_body().map(|body| listing.extract(&body, now));

                let _ = tx
                    .send(PageOutcome {
                        page,
                        url: request.url,
                        fetch,
                        listing,
                    })
                    .await;
            });
        }
        drop(tx);

        stats.pages_attempted += pages as usize;
        let mut by_page: BTreeMap<u32, Vec<ThreadSummary>> = BTreeMap::new();
        let mut received = 0usize;

        while let Some(outcome) = rx.recv().await {
            received += 1;
            if outcome.fetch.forbidden {
                stats.forbidden_failures += 1;
            }

            match outcome.listing {
                None => {
                    stats.pages_failed += 1;
                    tracing::warn!(
                        "Index page {} could not be fetched after {} attempts: {}",
                        outcome.page,
                        outcome.fetch.attempts,
                        outcome.url
                    );
                }
                Some(ListingOutcome::ContainerMissing) => {
                    stats.pages_fetched += 1;
                    stats.pages_container_missing += 1;
                    tracing::warn!(
                        "Index page {} has no thread table; the session may be invalid or the board has fewer pages",
                        outcome.page
                    );
                }
                Some(ListingOutcome::Parsed(page)) => {
                    stats.pages_fetched += 1;
                    stats.rows_skipped += page.skipped.len();
                    tracing::info!(
                        "Index page {} parsed: {} threads ({} rows skipped)",
                        outcome.page,
                        page.threads.len(),
                        page.skipped.len()
                    );
                    by_page.insert(outcome.page, page.threads);
                }
            }
        }

        // A worker that panicked never reported back
        let lost = (pages as usize).saturating_sub(received);
        if lost > 0 {
            tracing::warn!("{} index page workers exited without a result", lost);
            stats.pages_failed += lost;
        }

        by_page.into_values().flatten().collect()
    }

    /// Phase 2: fills in every record's content
    ///
    /// Each record is assigned to exactly one worker. Records whose page
    /// cannot be fetched get [`CONTENT_FETCH_FAILED`]. Record order is
    /// left untouched.
    pub async fn fetch_contents(&self, records: &mut [ThreadRecord], stats: &mut CrawlStats) {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.workers()));
        let (tx, mut rx) = mpsc::channel::<ContentOutcome>(self.workers());

        for (index, record) in records.iter().enumerate() {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let credentials = Arc::clone(&self.credentials);
            let extractor = Arc::clone(&self.content);
            let request = FetchRequest::new(record.summary.url.clone(), self.config.crawler.retries);

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let result = fetcher.fetch(&credentials, &request).await;
                let fetch = FetchSummary::from(&result);
                let content = result.into_body().map(|body| extractor.extract(&body));

                let _ = tx
                    .send(ContentOutcome {
                        index,
                        fetch,
                        content,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut filled = vec![false; total];
        let mut completed = 0usize;

        while let Some(outcome) = rx.recv().await {
            completed += 1;
            let record = &mut records[outcome.index];
            filled[outcome.index] = true;

            if outcome.fetch.forbidden {
                stats.forbidden_failures += 1;
            }

            match outcome.content {
                Some(content) => {
                    stats.threads_fetched += 1;
                    record.content = content;
                }
                None => {
                    stats.threads_failed += 1;
                    tracing::warn!(
                        "Thread {} could not be fetched after {} attempts",
                        record.summary.tid,
                        outcome.fetch.attempts
                    );
                    record.content = CONTENT_FETCH_FAILED.to_string();
                }
            }

            tracing::debug!(
                "Processed thread ({}/{}): {}",
                completed,
                total,
                preview(&record.summary.title, 30)
            );
            if completed % 10 == 0 {
                tracing::info!("Progress: {}/{} threads processed", completed, total);
            }
        }

        // A worker that panicked never reported back
        for (record, done) in records.iter_mut().zip(filled) {
            if !done {
                tracing::warn!("Thread {} worker exited without a result", record.summary.tid);
                stats.threads_failed += 1;
                record.content = CONTENT_FETCH_FAILED.to_string();
            }
        }
    }
}

/// First `max_chars` characters of `text`
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Runs a complete crawl with the current board time as `now`
///
/// # Example
///
/// ```no_run
/// use forum_sweep::config::load_config;
/// use forum_sweep::crawler::run_crawl;
/// use forum_sweep::Credentials;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("sweep.toml"))?;
/// let credentials = Credentials::from_config(&config.session)?;
/// let report = run_crawl(config, credentials).await?;
/// println!("{} threads", report.records.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, credentials: Credentials) -> Result<CrawlReport, SweepError> {
    let crawler = Crawler::new(config, credentials)?;
    let now = crawler.board_now();
    crawler.run(now).await
}
