//! Session credentials
//!
//! The forum rejects anonymous clients, so every request carries the cookie
//! jar obtained by an external bootstrap step (a real browser passing the
//! site's JavaScript challenge). This module only loads and renders that
//! jar; it never refreshes it.

use crate::config::validate_cookie_name;
use crate::config::SessionConfig;
use crate::SweepError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Cookie jar plus optional proxy, fixed for the lifetime of a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    cookies: BTreeMap<String, String>,
    proxy: Option<String>,
}

/// One entry of a browser cookie dump; extra fields are ignored
#[derive(Debug, Deserialize)]
struct BrowserCookie {
    name: String,
    value: String,
}

/// Accepted cookie file shapes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    Map(BTreeMap<String, String>),
    List(Vec<BrowserCookie>),
}

impl Credentials {
    pub fn new(cookies: BTreeMap<String, String>, proxy: Option<String>) -> Self {
        Self { cookies, proxy }
    }

    /// Builds credentials from the `[session]` config section
    ///
    /// Cookies from `cookie-file` are loaded first; inline cookies override
    /// them by name.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SweepError> {
        let mut cookies = match &config.cookie_file {
            Some(path) => load_cookie_file(path)?,
            None => BTreeMap::new(),
        };
        cookies.extend(
            config
                .cookies
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        if cookies.is_empty() {
            tracing::warn!("No session cookies configured; the board will likely reject requests");
        }

        Ok(Self::new(cookies, config.proxy.clone()))
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Renders the jar as a `Cookie` header value, or `None` when empty
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Loads a cookie dump written by the bootstrap step
///
/// Both a plain `{"name": "value"}` object and a browser-style array of
/// `{"name": .., "value": .., ...}` objects are accepted.
pub fn load_cookie_file(path: &Path) -> Result<BTreeMap<String, String>, SweepError> {
    let content = std::fs::read_to_string(path)?;
    let parsed: CookieFile = serde_json::from_str(&content)?;

    let cookies: BTreeMap<String, String> = match parsed {
        CookieFile::Map(map) => map,
        CookieFile::List(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
    };

    for name in cookies.keys() {
        validate_cookie_name(name).map_err(|e| {
            SweepError::Session(format!("{} in {}", e, path.display()))
        })?;
    }

    tracing::debug!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_cookie_header() {
        let mut cookies = BTreeMap::new();
        cookies.insert("b".to_string(), "2".to_string());
        cookies.insert("a".to_string(), "1".to_string());
        let credentials = Credentials::new(cookies, None);

        assert_eq!(credentials.cookie_header().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn test_empty_jar_has_no_header() {
        assert_eq!(Credentials::default().cookie_header(), None);
        assert!(Credentials::default().is_empty());
    }

    #[test]
    fn test_load_map_cookie_file() {
        let file = temp_file(r#"{"ngaPassportUid": "42", "guestJs": "1700000000"}"#);
        let cookies = load_cookie_file(file.path()).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["ngaPassportUid"], "42");
    }

    #[test]
    fn test_load_browser_cookie_dump() {
        let file = temp_file(
            r#"[
                {"name": "ngaPassportUid", "value": "42", "domain": ".nga.cn", "path": "/", "secure": false},
                {"name": "guestJs", "value": "1700000000", "httpOnly": true}
            ]"#,
        );
        let cookies = load_cookie_file(file.path()).unwrap();
        assert_eq!(cookies["guestJs"], "1700000000");
    }

    #[test]
    fn test_invalid_cookie_file() {
        let file = temp_file("not json");
        assert!(matches!(
            load_cookie_file(file.path()),
            Err(SweepError::Json(_))
        ));

        let file = temp_file(r#"{"bad name": "x"}"#);
        assert!(matches!(
            load_cookie_file(file.path()),
            Err(SweepError::Session(_))
        ));
    }

    #[test]
    fn test_inline_cookies_override_file() {
        let file = temp_file(r#"{"uid": "from-file", "sid": "abc"}"#);
        let mut inline = BTreeMap::new();
        inline.insert("uid".to_string(), "inline".to_string());

        let config = SessionConfig {
            cookies: inline,
            cookie_file: Some(file.path().to_path_buf()),
            proxy: Some("http://127.0.0.1:7897".to_string()),
        };

        let credentials = Credentials::from_config(&config).unwrap();
        assert_eq!(credentials.cookies()["uid"], "inline");
        assert_eq!(credentials.cookies()["sid"], "abc");
        assert_eq!(credentials.proxy(), Some("http://127.0.0.1:7897"));
    }
}
