//! Forum-Sweep: a polite forum section harvester
//!
//! This crate lists the threads of one forum section across its paginated
//! index pages, fetches the first page of every thread, and hands back a
//! time-ordered dataset of thread records.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod record;
pub mod session;
pub mod url;

use thiserror::Error;

/// Main error type for Forum-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("No threads listed after {pages_attempted} index pages ({pages_failed} failed to fetch)")]
    NoData {
        pages_attempted: usize,
        pages_failed: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SweepError {
    /// Creates a selector parsing error
    pub fn selector(selector: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Forum-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, Crawler};
pub use record::{ThreadRecord, ThreadSummary};
pub use session::Credentials;
