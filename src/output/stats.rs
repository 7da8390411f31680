//! Crawl statistics
//!
//! Every soft failure the crawler absorbs is counted here so the caller can
//! see how degraded a dataset is.

use std::time::Duration;

/// Counters collected over both crawl phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Index pages requested
    pub pages_attempted: usize,

    /// Index pages fetched successfully
    pub pages_fetched: usize,

    /// Index pages whose fetch exhausted its retries
    pub pages_failed: usize,

    /// Fetched index pages without a thread table
    pub pages_container_missing: usize,

    /// Listing rows skipped as unparseable
    pub rows_skipped: usize,

    /// Threads listed across all index pages
    pub threads_listed: usize,

    /// Thread pages fetched successfully
    pub threads_fetched: usize,

    /// Thread pages whose fetch exhausted its retries
    pub threads_failed: usize,

    /// Fetches (of either kind) that ended on HTTP 403
    pub forbidden_failures: usize,

    /// Wall time of the listing phase
    pub listing_elapsed: Duration,

    /// Wall time of the content phase
    pub content_elapsed: Duration,
}

impl CrawlStats {
    /// Share of index pages fetched, in percent
    pub fn page_success_rate(&self) -> f64 {
        percentage(self.pages_fetched, self.pages_attempted)
    }

    /// Share of thread pages fetched, in percent
    pub fn thread_success_rate(&self) -> f64 {
        percentage(self.threads_fetched, self.threads_listed)
    }

    /// True when anything was dropped or degraded along the way
    pub fn is_degraded(&self) -> bool {
        self.pages_failed > 0
            || self.pages_container_missing > 0
            || self.rows_skipped > 0
            || self.threads_failed > 0
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStats) {
    println!("=== Crawl Statistics ===\n");

    println!("Listing phase ({:.1}s):", stats.listing_elapsed.as_secs_f64());
    println!("  Index pages attempted: {}", stats.pages_attempted);
    println!(
        "  Index pages fetched: {} ({:.1}%)",
        stats.pages_fetched,
        stats.page_success_rate()
    );
    println!("  Index pages failed: {}", stats.pages_failed);
    println!(
        "  Index pages without thread table: {}",
        stats.pages_container_missing
    );
    println!("  Rows skipped: {}", stats.rows_skipped);
    println!("  Threads listed: {}", stats.threads_listed);
    println!();

    println!("Content phase ({:.1}s):", stats.content_elapsed.as_secs_f64());
    println!(
        "  Threads fetched: {} ({:.1}%)",
        stats.threads_fetched,
        stats.thread_success_rate()
    );
    println!("  Threads failed: {}", stats.threads_failed);
    println!();

    if stats.forbidden_failures > 0 {
        println!(
            "Requests that ended on 403 Forbidden: {} (session cookies have probably expired)",
            stats.forbidden_failures
        );
    }
}
