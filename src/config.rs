//! Runtime configuration from environment variables
//!
//! | Variable                 | Default                 |
//! |--------------------------|-------------------------|
//! | `ELASTIC_URL`            | `http://localhost:9200` |
//! | `ELASTIC_INDEX`          | `pcap-packets`          |
//! | `ELASTIC_USERNAME`       | unset                   |
//! | `ELASTIC_PASSWORD`       | unset                   |
//! | `ELASTIC_USE_DATE_INDEX` | `false`                 |
//! | `ELASTIC_MAX_RETRIES`    | `3`                     |
//! | `ELASTIC_TIMEOUT_SECS`   | `10`                    |
//! | `PIPELINE_BATCH_SIZE`    | `1`                     |
//! | `METRICS_PORT`           | `9100`                  |
//! | `PCAP_FILE`              | unset                   |
//!
//! Empty values are treated as unset.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::delivery::{IndexTarget, RetryPolicy};
use crate::{IndexerError, Result};

pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";
pub const DEFAULT_INDEX: &str = "pcap-packets";
pub const DEFAULT_METRICS_PORT: u16 = 9100;

/// Connection settings for the Elasticsearch store
#[derive(Clone, PartialEq, Eq)]
pub struct ElasticConfig {
    /// Base URL without trailing slash
    pub url: String,
    /// Target base name
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_date_index: bool,
    /// Total attempts per delivery, at least 1
    pub max_retries: u32,
    pub timeout: Duration,
}

impl ElasticConfig {
    /// Basic auth credentials, present only when both halves are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn target(&self) -> IndexTarget {
        if self.use_date_index {
            IndexTarget::daily(&self.index)
        } else {
            IndexTarget::fixed(&self.index)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ELASTIC_URL.to_string(),
            index: DEFAULT_INDEX.to_string(),
            username: None,
            password: None,
            use_date_index: false,
            max_retries: 3,
            timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_date_index", &self.use_date_index)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub elastic: ElasticConfig,
    pub metrics_port: u16,
    /// 1 delivers each record on its own, more groups records into bulk requests
    pub batch_size: usize,
    pub pcap_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elastic: ElasticConfig::default(),
            metrics_port: DEFAULT_METRICS_PORT,
            batch_size: 1,
            pcap_file: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let max_retries: u32 =
            parse_or(&get, "ELASTIC_MAX_RETRIES", defaults.elastic.max_retries)?;
        if max_retries == 0 {
            return Err(IndexerError::config("ELASTIC_MAX_RETRIES", "must be at least 1"));
        }

        let batch_size: usize = parse_or(&get, "PIPELINE_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(IndexerError::config("PIPELINE_BATCH_SIZE", "must be at least 1"));
        }

        let timeout_secs: u64 =
            parse_or(&get, "ELASTIC_TIMEOUT_SECS", defaults.elastic.timeout.as_secs())?;

        let elastic = ElasticConfig {
            url: get("ELASTIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.elastic.url),
            index: get("ELASTIC_INDEX").unwrap_or(defaults.elastic.index),
            username: get("ELASTIC_USERNAME"),
            password: get("ELASTIC_PASSWORD"),
            use_date_index: match get("ELASTIC_USE_DATE_INDEX") {
                Some(value) => parse_bool("ELASTIC_USE_DATE_INDEX", &value)?,
                None => defaults.elastic.use_date_index,
            },
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            elastic,
            metrics_port: parse_or(&get, "METRICS_PORT", defaults.metrics_port)?,
            batch_size,
            pcap_file: get("PCAP_FILE").map(PathBuf::from),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexerError::config(key, format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(IndexerError::config(key, format!("'{}' is not a boolean", raw))),
    }
}
