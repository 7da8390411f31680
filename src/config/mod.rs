//! Configuration module for Forum-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use forum_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Scanning {} index pages", config.board.pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BoardConfig, Config, CrawlerConfig, HeaderConfig, OutputConfig, OutputFormat, SessionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
pub(crate) use validation::validate_cookie_name;
