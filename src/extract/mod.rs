//! Structured extraction from forum markup
//!
//! This module turns raw pages into typed data:
//! - `DateNormalizer` maps the site's post-date strings onto instants
//! - `ListingExtractor` parses index pages into thread summaries
//! - `ContentExtractor` collects the post bodies of a thread page

mod content;
mod date;
mod listing;

pub use content::{ContentExtractor, POST_SEPARATOR};
pub use date::{
    epoch_sentinel, format_instant, DateNormalizer, INSTANT_FORMAT, TODAY_MARKER,
    YESTERDAY_MARKER,
};
pub use listing::{ListingExtractor, ListingOutcome, ListingPage, RowError, SkippedRow};

use crate::SweepError;
use scraper::{ElementRef, Selector};

/// Parses a CSS selector, mapping failures into `SweepError::Selector`
pub(crate) fn parse_selector(selector: &str) -> Result<Selector, SweepError> {
    Selector::parse(selector).map_err(|e| SweepError::selector(selector, format!("{:?}", e)))
}

/// Text of an element: each text node trimmed, empty ones dropped, the rest
/// joined with `separator`
pub(crate) fn element_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
