//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::server::DEFAULT_BODY_LIMIT;

/// shelf configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Listen address.
    pub addr: SocketAddr,
    /// Root of the directory backend; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Path prefix in front of every collection, e.g. `/api`.
    pub api_prefix: String,
    /// Collision-check random ids against the collection.
    pub verify_ids: bool,
    /// Requests queued per instance before callers wait.
    pub mailbox: usize,
    /// Largest request body accepted, in bytes.
    pub max_body: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8787)),
            data_dir: None,
            api_prefix: "/api".to_owned(),
            verify_ids: false,
            mailbox: 64,
            max_body: DEFAULT_BODY_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All optional:
    /// - `SHELF_ADDR`: listen address (default: `0.0.0.0:8787`)
    /// - `SHELF_DATA_DIR`: directory for durable storage (default: in memory)
    /// - `SHELF_API_PREFIX`: collection path prefix (default: `/api`)
    /// - `SHELF_VERIFY_IDS`: `true`/`false`, check random ids for collisions (default: `false`)
    /// - `SHELF_MAILBOX`: per-instance queue depth (default: 64)
    /// - `SHELF_MAX_BODY`: request body limit in bytes (default: 1 MiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Config::from_env) with variables read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let addr = match lookup("SHELF_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("SHELF_ADDR", "must be a host:port socket address"))?,
            None => defaults.addr,
        };

        let data_dir = lookup("SHELF_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let api_prefix = match lookup("SHELF_API_PREFIX") {
            Some(raw) => {
                if !raw.starts_with('/') || (raw.len() > 1 && raw.ends_with('/')) {
                    return Err(ConfigError::Invalid(
                        "SHELF_API_PREFIX",
                        "must start with `/` and not end with one",
                    ));
                }
                raw
            }
            None => defaults.api_prefix,
        };

        let verify_ids = match lookup("SHELF_VERIFY_IDS").as_deref() {
            None => defaults.verify_ids,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(_) => return Err(ConfigError::Invalid("SHELF_VERIFY_IDS", "must be true or false")),
        };

        let mailbox = match lookup("SHELF_MAILBOX") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid("SHELF_MAILBOX", "must be a positive integer"))?,
            None => defaults.mailbox,
        };

        let max_body = match lookup("SHELF_MAX_BODY") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid("SHELF_MAX_BODY", "must be a positive byte count"))?,
            None => defaults.max_body,
        };

        Ok(Self { addr, data_dir, api_prefix, verify_ids, mailbox, max_body })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
