use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Forum-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub board: BoardConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub headers: HeaderConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The forum section being harvested
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Site root, e.g. `https://bbs.nga.cn`
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Section (forum) identifier
    pub fid: u32,

    /// Number of index pages to scan, starting at page 1
    pub pages: u32,

    /// Character encoding the site serves its pages in
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Offset from UTC of the site's wall clock, used for Unix timestamps
    /// and relative dates
    #[serde(rename = "utc-offset-hours", default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Worker pool, politeness and retry behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Size of the worker pool used by both phases
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Lower bound of the jitter sleep before every fetch (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the jitter sleep before every fetch (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempts per request before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base back-off after a failed attempt (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Ceiling for the exponential back-off (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Request headers sent with every fetch
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderConfig {
    /// Pool of user agents; one is picked at random per request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Defaults to the first index page of the board
    #[serde(default)]
    pub referer: Option<String>,
}

/// Session credentials handed over by the bootstrap step
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Inline cookies; these win over cookies loaded from `cookie-file`
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// JSON cookie dump produced by the browser bootstrap
    #[serde(rename = "cookie-file", default)]
    pub cookie_file: Option<PathBuf>,

    /// Proxy endpoint all requests are tunneled through
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Where the finished dataset is written
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

/// Serialization format of the dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            referer: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: OutputFormat::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://bbs.nga.cn".to_string()
}

fn default_encoding() -> String {
    "gbk".to_string()
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_workers() -> u32 {
    10
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    3000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
        .to_string()
}

fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en;q=0.8".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("threads.csv")
}

impl BoardConfig {
    /// The board's wall-clock offset, or `None` if out of range
    pub fn utc_offset(&self) -> Option<chrono::FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(chrono::FixedOffset::east_opt)
    }

    /// The encoding named by `encoding`, or `None` if the label is unknown
    pub fn text_encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.encoding.trim().as_bytes())
    }
}
