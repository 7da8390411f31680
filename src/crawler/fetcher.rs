//! HTTP fetcher implementation
//!
//! This module handles every request the crawler makes:
//! - Building the shared HTTP client (timeouts, compression, proxy)
//! - A randomized politeness delay before each fetch
//! - User-agent rotation and session cookie injection
//! - Retry with back-off, with 403 responses tracked separately
//! - Decoding the body from the site's encoding

use crate::config::Config;
use crate::crawler::backoff::{Backoff, DelayRange};
use crate::session::Credentials;
use crate::SweepError;
use encoding_rs::Encoding;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use std::fmt;
use std::time::Duration;

/// A single page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,

    /// Attempts allowed before giving up; a budget of 0 still makes one
    /// attempt
    pub retries: u32,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, retries: u32) -> Self {
        Self {
            url: url.into(),
            retries,
        }
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// HTTP 403, usually an expired or rejected session
    Forbidden,

    /// Any other non-2xx status
    Status(u16),

    /// The request timed out
    Timeout,

    /// Connection or protocol failure
    Network(String),

    /// The response body could not be read
    Body(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => write!(f, "HTTP 403 Forbidden"),
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Timeout => write!(f, "request timeout"),
            Self::Network(error) => write!(f, "network error: {}", error),
            Self::Body(error) => write!(f, "body error: {}", error),
        }
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The page was fetched and decoded
    Success {
        /// Decoded page markup
        body: String,
        /// Attempts used, including the successful one
        attempts: u32,
    },

    /// Every attempt failed
    Failed {
        /// Attempts made: the full retry budget, and never fewer than one
        attempts: u32,
        /// Cause of the final attempt's failure
        last: FetchFailure,
        /// How many of the attempts were answered with 403
        forbidden: u32,
    },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// True when the final attempt was rejected with 403
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                last: FetchFailure::Forbidden,
                ..
            }
        )
    }

    pub fn into_body(self) -> Option<String> {
        match self {
            Self::Success { body, .. } => Some(body),
            Self::Failed { .. } => None,
        }
    }
}

/// Builds the HTTP client shared by every worker
///
/// Requests go through the credential bag's proxy when one is set, and
/// never through a proxy picked up from the environment otherwise.
pub fn build_http_client(config: &Config, credentials: &Credentials) -> Result<Client, SweepError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.crawler.timeout_secs))
        .connect_timeout(Duration::from_secs(config.crawler.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    builder = match credentials.proxy() {
        Some(proxy) => builder.proxy(Proxy::all(proxy)?),
        None => builder.no_proxy(),
    };

    Ok(builder.build()?)
}

/// Performs GET requests with jitter, header rotation and retries
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    user_agents: Vec<String>,
    accept: String,
    accept_language: String,
    referer: String,
    jitter: DelayRange,
    backoff: Backoff,
    encoding: &'static Encoding,
}

impl Fetcher {
    /// Creates a fetcher from the crawler configuration
    ///
    /// `referer` is sent when the configuration does not name one.
    pub fn new(
        config: &Config,
        credentials: &Credentials,
        referer: impl Into<String>,
    ) -> Result<Self, SweepError> {
        let encoding = config.board.text_encoding().ok_or_else(|| {
            SweepError::Config(crate::ConfigError::Validation(format!(
                "Unknown encoding label '{}'",
                config.board.encoding
            )))
        })?;

        Ok(Self {
            client: build_http_client(config, credentials)?,
            user_agents: config.headers.user_agents.clone(),
            accept: config.headers.accept.clone(),
            accept_language: config.headers.accept_language.clone(),
            referer: config
                .headers
                .referer
                .clone()
                .unwrap_or_else(|| referer.into()),
            jitter: DelayRange::new(config.crawler.min_delay_ms, config.crawler.max_delay_ms),
            backoff: Backoff::new(config.crawler.retry_backoff_ms, config.crawler.max_backoff_ms),
            encoding,
        })
    }

    /// Fetches a page, retrying until it succeeds or the budget runs out
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Decode and return |
    /// | HTTP 403 | Retry immediately with the same credentials |
    /// | Other status | Back off, then retry |
    /// | Timeout / connection error | Back off, then retry |
    ///
    /// The budget is `request.retries` with a floor of one attempt. No
    /// back-off follows the final attempt. The jitter delay is taken once,
    /// before the first attempt, and one user agent is used for all attempts.
    pub async fn fetch(&self, credentials: &Credentials, request: &FetchRequest) -> FetchResult {
        let budget = request.retries.max(1);

        tokio::time::sleep(self.jitter.sample()).await;
        let user_agent = self.pick_user_agent();
        let cookie = credentials.cookie_header();

        let mut forbidden = 0;
        let mut last = FetchFailure::Network("no attempt made".to_string());

        for attempt in 1..=budget {
            match self
                .attempt(&request.url, &user_agent, cookie.as_deref())
                .await
            {
                Ok(body) => {
                    tracing::debug!("Fetched {} (attempt {}/{})", request.url, attempt, budget);
                    return FetchResult::Success {
                        body,
                        attempts: attempt,
                    };
                }
                Err(FetchFailure::Forbidden) => {
                    forbidden += 1;
                    tracing::warn!(
                        "Request {} got 403 Forbidden (attempt {}/{}); session cookies may have expired",
                        request.url,
                        attempt,
                        budget
                    );
                    last = FetchFailure::Forbidden;
                }
                Err(failure) => {
                    tracing::warn!(
                        "Request {} failed (attempt {}/{}): {}",
                        request.url,
                        attempt,
                        budget,
                        failure
                    );
                    last = failure;
                    if attempt < budget {
                        tokio::time::sleep(self.backoff.delay(attempt - 1)).await;
                    }
                }
            }
        }

        FetchResult::Failed {
            attempts: budget,
            last,
            forbidden,
        }
    }

    /// Makes one GET request
    async fn attempt(
        &self,
        url: &str,
        user_agent: &str,
        cookie: Option<&str>,
    ) -> Result<String, FetchFailure> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, self.accept.as_str())
            .header(ACCEPT_LANGUAGE, self.accept_language.as_str())
            .header(REFERER, self.referer.as_str());

        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            return Err(FetchFailure::Forbidden);
        }

        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Body(e.to_string())
            }
        })?;

        Ok(self.decode(&bytes, url))
    }

    /// Decodes a body with the site's encoding, replacing invalid sequences
    fn decode(&self, bytes: &[u8], url: &str) -> String {
        let (text, used, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            tracing::debug!("Body of {} had invalid {} sequences", url, used.name());
        }
        text.into_owned()
    }

    fn pick_user_agent(&self) -> String {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}

fn classify_error(error: reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network(error.to_string())
    }
}
