//! Thread page extraction

use crate::extract::{element_text, parse_selector};
use crate::SweepError;
use scraper::{Html, Selector};

const POST_BODY: &str = "span.postcontent.ubbcode";

/// Placed between consecutive posts of the same thread page
pub const POST_SEPARATOR: &str = "\n\n--- new post ---\n\n";

/// Pulls the post bodies out of a thread page
#[derive(Debug)]
pub struct ContentExtractor {
    post_body: Selector,
}

impl ContentExtractor {
    pub fn new() -> Result<Self, SweepError> {
        Ok(Self {
            post_body: parse_selector(POST_BODY)?,
        })
    }

    /// Returns every post body on the page, in document order, joined by
    /// [`POST_SEPARATOR`]
    ///
    /// Line breaks inside a post are kept. A page without posts yields an
    /// empty string.
    pub fn extract(&self, markup: &str) -> String {
        let document = Html::parse_document(markup);

        document
            .select(&self.post_body)
            .map(|post| element_text(post, "\n"))
            .collect::<Vec<_>>()
            .join(POST_SEPARATOR)
    }
}
