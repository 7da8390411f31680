//! Index page extraction
//!
//! An index page holds a `table#topicrows` with one `tr.topicrow` per thread.
//! Each row is parsed on its own; a bad row is reported and skipped without
//! affecting its neighbours.

use crate::extract::{element_text, epoch_sentinel, parse_selector, DateNormalizer};
use crate::record::{ThreadSummary, UNKNOWN_AUTHOR};
use crate::url::{extract_tid, BoardUrls};
use crate::SweepError;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

const CONTAINER: &str = "table#topicrows";
const ROW: &str = "tr.topicrow";
const REPLIES: &str = "td.c1 > a.replies";
const TITLE: &str = "td.c2 > a.topic";
const AUTHOR: &str = "td.c3 > a.author";
const POST_DATE: &str = "td.c3 > span.postdate";

/// Why a single listing row was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row has no title link")]
    MissingTitle,

    #[error("title link has no href")]
    MissingLink,

    #[error("no thread id in link '{href}'")]
    MissingTid { href: String },

    #[error("reply count '{raw}' is not a number")]
    InvalidReplyCount { raw: String },
}

/// A row that could not be turned into a thread summary
#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub error: RowError,

    /// Flattened text of the row, for diagnostics
    pub text: String,
}

/// Threads extracted from one index page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub threads: Vec<ThreadSummary>,
    pub skipped: Vec<SkippedRow>,
}

/// Result of extracting an index page
#[derive(Debug, Clone)]
pub enum ListingOutcome {
    /// The thread table is absent: the session was likely rejected, or the
    /// page is past the end of the board
    ContainerMissing,

    /// The thread table was found; it may still hold zero threads
    Parsed(ListingPage),
}

impl ListingOutcome {
    /// Threads found, empty when the container was missing
    pub fn threads(&self) -> &[ThreadSummary] {
        match self {
            Self::ContainerMissing => &[],
            Self::Parsed(page) => &page.threads,
        }
    }

    pub fn into_threads(self) -> Vec<ThreadSummary> {
        match self {
            Self::ContainerMissing => Vec::new(),
            Self::Parsed(page) => page.threads,
        }
    }
}

/// Parses index pages into thread summaries
#[derive(Debug)]
pub struct ListingExtractor {
    urls: BoardUrls,
    normalizer: DateNormalizer,
    container: Selector,
    row: Selector,
    replies: Selector,
    title: Selector,
    author: Selector,
    post_date: Selector,
}

impl ListingExtractor {
    /// Creates an extractor that builds thread URLs with `urls` and
    /// normalizes dates with `normalizer`
    pub fn new(urls: BoardUrls, normalizer: DateNormalizer) -> Result<Self, SweepError> {
        Ok(Self {
            urls,
            normalizer,
            container: parse_selector(CONTAINER)?,
            row: parse_selector(ROW)?,
            replies: parse_selector(REPLIES)?,
            title: parse_selector(TITLE)?,
            author: parse_selector(AUTHOR)?,
            post_date: parse_selector(POST_DATE)?,
        })
    }

    /// Extracts every thread row from an index page
    ///
    /// Relative dates are resolved against `now`. Rows that fail to parse
    /// are logged and returned in [`ListingPage::skipped`].
    pub fn extract(&self, markup: &str, now: NaiveDateTime) -> ListingOutcome {
        let document = Html::parse_document(markup);

        let Some(table) = document.select(&self.container).next() else {
            return ListingOutcome::ContainerMissing;
        };

        let mut page = ListingPage::default();
        for row in table.select(&self.row) {
            match self.parse_row(row, now) {
                Ok(thread) => page.threads.push(thread),
                Err(error) => {
                    let text = element_text(row, " | ");
                    tracing::warn!("Skipping listing row ({}): '{}'", error, text);
                    page.skipped.push(SkippedRow { error, text });
                }
            }
        }

        ListingOutcome::Parsed(page)
    }

    /// Parses one `tr.topicrow`
    fn parse_row(&self, row: ElementRef<'_>, now: NaiveDateTime) -> Result<ThreadSummary, RowError> {
        let replies = match row.select(&self.replies).next() {
            Some(tag) => {
                let raw = tag.text().collect::<String>();
                raw.trim()
                    .parse::<u32>()
                    .map_err(|_| RowError::InvalidReplyCount {
                        raw: raw.trim().to_string(),
                    })?
            }
            None => 0,
        };

        let title_tag = row.select(&self.title).next().ok_or(RowError::MissingTitle)?;
        let title = title_tag.text().collect::<String>().trim().to_string();
        let href = title_tag.value().attr("href").ok_or(RowError::MissingLink)?;
        let tid = extract_tid(href).ok_or_else(|| RowError::MissingTid {
            href: href.to_string(),
        })?;

        let author = row
            .select(&self.author)
            .next()
            .map(|tag| tag.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

        let post_time = match row.select(&self.post_date).next() {
            Some(tag) => self
                .normalizer
                .normalize(&tag.text().collect::<String>(), now),
            None => epoch_sentinel(),
        };

        Ok(ThreadSummary {
            url: self.urls.thread(&tid),
            tid,
            title,
            author,
            post_time,
            replies,
        })
    }
}
