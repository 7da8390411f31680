use crate::config::types::{BoardConfig, Config, CrawlerConfig, HeaderConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_board_config(&config.board)?;
    validate_crawler_config(&config.crawler)?;
    validate_header_config(&config.headers)?;
    validate_session_config(&config.session)?;
    Ok(())
}

/// Validates the board section
fn validate_board_config(config: &BoardConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.pages < 1 {
        return Err(ConfigError::Validation(format!(
            "pages must be >= 1, got {}",
            config.pages
        )));
    }

    if config.text_encoding().is_none() {
        return Err(ConfigError::Validation(format!(
            "Unknown encoding label '{}'",
            config.encoding
        )));
    }

    if !(-12..=14).contains(&config.utc_offset_hours) || config.utc_offset().is_none() {
        return Err(ConfigError::Validation(format!(
            "utc-offset-hours must be between -12 and 14, got {}",
            config.utc_offset_hours
        )));
    }

    Ok(())
}

/// Validates worker pool, delay and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.retries < 1 {
        return Err(ConfigError::Validation(format!(
            "retries must be >= 1, got {}",
            config.retries
        )));
    }

    if config.retry_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "retry-backoff-ms ({}) must not exceed max-backoff-ms ({})",
            config.retry_backoff_ms, config.max_backoff_ms
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the header template
fn validate_header_config(config: &HeaderConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;
    }

    Ok(())
}

/// Validates cookie names and the proxy endpoint
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    for name in config.cookies.keys() {
        validate_cookie_name(name)?;
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Cookie names may not contain separators or whitespace
pub(crate) fn validate_cookie_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "Cookie name cannot be empty".to_string(),
        ));
    }

    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','))
    {
        return Err(ConfigError::Validation(format!(
            "Cookie name '{}' contains invalid characters",
            name
        )));
    }

    Ok(())
}
