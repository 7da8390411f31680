//! Thread records produced by a crawl
//!
//! A `ThreadSummary` is what an index page tells us about a thread. Once the
//! listing phase finishes every summary becomes a `ThreadRecord`, whose
//! `content` is filled in exactly once by the content phase.

use crate::extract::format_instant;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Author recorded when a row carries no author element
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Content recorded when a thread page could not be fetched
pub const CONTENT_FETCH_FAILED: &str = "抓取失败";

/// One thread as listed on an index page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    /// Thread id parsed from the permalink
    pub tid: String,

    pub title: String,

    pub author: String,

    /// Normalized post time in the board's wall clock
    #[serde(serialize_with = "serialize_instant")]
    pub post_time: NaiveDateTime,

    /// Reply count shown on the index page
    pub replies: u32,

    /// Detail page URL
    pub url: String,
}

/// A listed thread together with its first-page content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRecord {
    #[serde(flatten)]
    pub summary: ThreadSummary,

    /// Concatenated post bodies, or `CONTENT_FETCH_FAILED`
    pub content: String,
}

impl ThreadRecord {
    /// Wraps a summary with empty content
    pub fn new(summary: ThreadSummary) -> Self {
        Self {
            summary,
            content: String::new(),
        }
    }

    /// Whether the content phase gave up on this thread
    pub fn content_failed(&self) -> bool {
        self.content == CONTENT_FETCH_FAILED
    }
}

impl From<ThreadSummary> for ThreadRecord {
    fn from(summary: ThreadSummary) -> Self {
        Self::new(summary)
    }
}

/// Sorts summaries newest first
///
/// The sort is stable, so threads sharing a post time keep the order they
/// were encountered in.
pub fn sort_newest_first(summaries: &mut [ThreadSummary]) {
    summaries.sort_by(|a, b| b.post_time.cmp(&a.post_time));
}

fn serialize_instant<S: Serializer>(instant: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_instant(instant))
}
