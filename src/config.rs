//! NNTP server and indexing run configuration

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::store::QueryFilter;

/// Default socket timeout for connect and read operations
const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 60;

/// NNTP server configuration
///
/// Contains all the information needed to connect to an NNTP server.
///
/// # Example
///
/// ```
/// use usenet_indexer::ServerConfig;
///
/// // Recommended: use the constructor methods
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
///
/// // Plain (unencrypted) connection on port 119
/// let config = ServerConfig::plain("news.example.com", "user", "pass");
/// ```
#[must_use]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    pub port: u16,

    /// Use TLS/SSL encryption
    #[cfg_attr(feature = "serde", serde(default = "default_tls"))]
    pub tls: bool,

    /// Allow insecure TLS connections (self-signed certificates, expired certificates)
    ///
    /// **Security Warning:** Setting this to `true` disables certificate validation,
    /// making your connection vulnerable to man-in-the-middle attacks. Only use this
    /// for testing or with servers you trust on a secure network.
    #[cfg_attr(feature = "serde", serde(default))]
    pub allow_insecure_tls: bool,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Socket timeout applied to connect and single-line reads
    #[cfg_attr(feature = "serde", serde(default = "default_timeout", skip))]
    pub timeout: Duration,
}

#[cfg(feature = "serde")]
fn default_tls() -> bool {
    true
}

#[cfg(feature = "serde")]
fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS)
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tls: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            allow_insecure_tls: false,
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS),
        }
    }

    /// Create a configuration for a TLS connection on the standard secure port (563)
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 563, true, username, password)
    }

    /// Create a configuration for a plain connection on the standard port (119)
    ///
    /// **Warning:** Plain connections transmit credentials in clear text.
    /// Use TLS connections whenever possible.
    pub fn plain(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 119, false, username, password)
    }

    /// Create a TLS configuration that accepts self-signed certificates
    ///
    /// **Security Warning:** This configuration disables certificate validation.
    /// Only use this for testing or with servers you trust on a secure network.
    pub fn tls_insecure(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::tls(host, username, password);
        config.allow_insecure_tls = true;
        config
    }
}

/// Configuration for one indexing run over a single newsgroup
///
/// Mirrors the INI-style configuration surface of the indexer: connection
/// parameters live in [`ServerConfig`]; everything here scopes the fetch
/// range, the query filters and the NZB output.
#[must_use]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexerConfig {
    /// Target newsgroup
    pub group: String,

    /// Upper article number of the fetch range (inclusive)
    pub start: u64,

    /// Lower article number of the fetch range (inclusive)
    pub back_filled_up_to: u64,

    /// Concurrency cap, valid 1-64 (default 10)
    #[cfg_attr(feature = "serde", serde(default = "default_max_workers"))]
    pub max_workers: u32,

    /// Articles per XOVER request (default 100000)
    #[cfg_attr(feature = "serde", serde(default = "default_chunk_size"))]
    pub chunk_size: u64,

    /// Case-insensitive substring the subject must contain
    #[cfg_attr(feature = "serde", serde(default))]
    pub subject_like: Option<String>,

    /// Case-insensitive substring the subject must not contain
    #[cfg_attr(feature = "serde", serde(default))]
    pub not_subject: Option<String>,

    /// Case-insensitive substring the From header must contain
    #[cfg_attr(feature = "serde", serde(default))]
    pub from_like: Option<String>,

    /// Inclusive lower bound of the date window, ISO-8601 (`YYYY-MM-DD`)
    #[cfg_attr(feature = "serde", serde(default))]
    pub date_from: Option<String>,

    /// Inclusive upper bound of the date window, ISO-8601 (`YYYY-MM-DD`)
    #[cfg_attr(feature = "serde", serde(default))]
    pub date_to: Option<String>,

    /// Drop multi-part files with missing segments
    #[cfg_attr(feature = "serde", serde(default))]
    pub require_complete_sets: bool,

    /// Emit one NZB per (poster, collection) instead of a single document
    #[cfg_attr(feature = "serde", serde(default))]
    pub group_by_collection: bool,

    /// Directory for NZB output
    #[cfg_attr(feature = "serde", serde(default = "default_output_path"))]
    pub output_path: PathBuf,
}

fn default_max_workers() -> u32 {
    10
}

fn default_chunk_size() -> u64 {
    100_000
}

fn default_output_path() -> PathBuf {
    PathBuf::from(".")
}

impl IndexerConfig {
    /// Create a configuration for a fetch range with default tuning
    pub fn new(group: impl Into<String>, back_filled_up_to: u64, start: u64) -> Self {
        Self {
            group: group.into(),
            start,
            back_filled_up_to,
            max_workers: default_max_workers(),
            chunk_size: default_chunk_size(),
            subject_like: None,
            not_subject: None,
            from_like: None,
            date_from: None,
            date_to: None,
            require_complete_sets: false,
            group_by_collection: false,
            output_path: default_output_path(),
        }
    }

    /// Validate every option against its documented range
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.group.is_empty() {
            return Err(Error::config("group", "target newsgroup must be set"));
        }
        if !(1..=64).contains(&self.max_workers) {
            return Err(Error::config(
                "max_workers",
                format!("must be between 1 and 64, got {}", self.max_workers),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size", "must be at least 1"));
        }
        if self.back_filled_up_to > self.start {
            return Err(Error::config(
                "back_filled_up_to",
                format!(
                    "lower bound {} exceeds upper bound {}",
                    self.back_filled_up_to, self.start
                ),
            ));
        }
        if let Some(raw) = &self.date_from {
            parse_iso_date(raw).map_err(|_| Error::config("date_from", bad_date(raw)))?;
        }
        if let Some(raw) = &self.date_to {
            parse_iso_date(raw).map_err(|_| Error::config("date_to", bad_date(raw)))?;
        }
        Ok(())
    }

    /// Build the store query filter described by this configuration
    ///
    /// The date window is converted to inclusive UNIX-epoch bounds:
    /// `date_from` starts at midnight UTC, `date_to` extends to the end of
    /// the named day.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a date does not parse as `YYYY-MM-DD`.
    pub fn query_filter(&self) -> Result<QueryFilter> {
        let date_from_unix = match &self.date_from {
            Some(raw) => Some(
                parse_iso_date(raw)
                    .map_err(|_| Error::config("date_from", bad_date(raw)))?
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time")
                    .and_utc()
                    .timestamp(),
            ),
            None => None,
        };
        let date_to_unix = match &self.date_to {
            Some(raw) => Some(
                parse_iso_date(raw)
                    .map_err(|_| Error::config("date_to", bad_date(raw)))?
                    .and_hms_opt(23, 59, 59)
                    .expect("end of day is always a valid time")
                    .and_utc()
                    .timestamp(),
            ),
            None => None,
        };

        Ok(QueryFilter {
            group_name: self.group.clone(),
            subject_like: self.subject_like.clone(),
            not_subject: self.not_subject.clone(),
            from_like: self.from_like.clone(),
            date_from_unix,
            date_to_unix,
            limit: None,
        })
    }
}

fn parse_iso_date(raw: &str) -> std::result::Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
}

fn bad_date(raw: &str) -> String {
    format!("expected ISO-8601 date (YYYY-MM-DD), got {:?}", raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_helpers() {
        let config = ServerConfig::tls("news.example.com", "user", "pass");
        assert_eq!(config.port, 563);
        assert!(config.tls);
        assert!(!config.allow_insecure_tls);

        let config = ServerConfig::plain("news.example.com", "user", "pass");
        assert_eq!(config.port, 119);
        assert!(!config.tls);

        let config = ServerConfig::tls_insecure("localhost", "user", "pass");
        assert!(config.tls);
        assert!(config.allow_insecure_tls);
    }

    #[test]
    fn test_server_config_default_timeout() {
        let config = ServerConfig::tls("news.example.com", "user", "pass");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_indexer_config_defaults() {
        let config = IndexerConfig::new("alt.binaries.test", 1, 1000);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.chunk_size, 100_000);
        assert!(!config.require_complete_sets);
        assert!(!config.group_by_collection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_worker_bounds() {
        let mut config = IndexerConfig::new("alt.binaries.test", 1, 1000);

        config.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(k), .. }) if k == "max_workers"
        ));

        config.max_workers = 65;
        assert!(config.validate().is_err());

        config.max_workers = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_range_order() {
        let config = IndexerConfig::new("alt.binaries.test", 2000, 1000);
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(k), .. }) if k == "back_filled_up_to"
        ));
    }

    #[test]
    fn test_validate_empty_group() {
        let config = IndexerConfig::new("", 1, 1000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_query_filter_date_window() {
        let mut config = IndexerConfig::new("alt.binaries.test", 1, 1000);
        config.date_from = Some("2024-01-01".to_string());
        config.date_to = Some("2024-01-01".to_string());

        let filter = config.query_filter().unwrap();
        // Midnight through end of day, inclusive
        assert_eq!(filter.date_from_unix, Some(1_704_067_200));
        assert_eq!(filter.date_to_unix, Some(1_704_153_599));
    }

    #[test]
    fn test_query_filter_rejects_bad_date() {
        let mut config = IndexerConfig::new("alt.binaries.test", 1, 1000);
        config.date_from = Some("01/01/2024".to_string());
        assert!(config.validate().is_err());
        assert!(config.query_filter().is_err());
    }
}
