//! URL shapes of the forum
//!
//! The crawler only ever requests two kinds of page: a section's index
//! listing (`thread.php?fid=..&page=..`) and a thread's detail page
//! (`read.php?tid=..`).

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static TID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tid=(\d+)").expect("valid regex"));

/// Builds listing and thread URLs for one board
#[derive(Debug, Clone)]
pub struct BoardUrls {
    base: Url,
    fid: u32,
}

impl BoardUrls {
    /// Creates URL builders rooted at `base_url`
    ///
    /// # Example
    ///
    /// ```
    /// use forum_sweep::url::BoardUrls;
    ///
    /// let urls = BoardUrls::new("https://bbs.nga.cn", 853).unwrap();
    /// assert_eq!(urls.listing(2), "https://bbs.nga.cn/thread.php?fid=853&page=2");
    /// assert_eq!(urls.thread("123"), "https://bbs.nga.cn/read.php?tid=123");
    /// ```
    pub fn new(base_url: &str, fid: u32) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base_url)?;

        // Keep any path prefix when joining relative page names
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base, fid })
    }

    pub fn fid(&self) -> u32 {
        self.fid
    }

    /// Index listing URL for a 1-based page number
    pub fn listing(&self, page: u32) -> String {
        let mut url = self.page_url("thread.php");
        url.query_pairs_mut()
            .append_pair("fid", &self.fid.to_string())
            .append_pair("page", &page.to_string());
        url.to_string()
    }

    /// Listing URL without a page number, used as the default referer
    pub fn board(&self) -> String {
        let mut url = self.page_url("thread.php");
        url.query_pairs_mut()
            .append_pair("fid", &self.fid.to_string());
        url.to_string()
    }

    /// Detail page URL of a thread
    pub fn thread(&self, tid: &str) -> String {
        let mut url = self.page_url("read.php");
        url.query_pairs_mut().append_pair("tid", tid);
        url.to_string()
    }

    fn page_url(&self, page: &str) -> Url {
        // `page` is a fixed relative name, so joining cannot fail
        self.base.join(page).unwrap_or_else(|_| self.base.clone())
    }
}

/// Extracts the numeric thread id from a permalink
///
/// Returns `None` when the link carries no `tid=<digits>` parameter.
pub fn extract_tid(href: &str) -> Option<String> {
    TID_PATTERN
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
