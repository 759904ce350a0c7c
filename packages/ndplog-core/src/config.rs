//! Configuration file loading.
//!
//! The config file is flat `key = value` text with `#` comments:
//!
//! ```text
//! # ndplog.conf
//! db = sqlite:///var/lib/ndplog/arplog.db
//! host = linux,-
//! host = linux-json,core1.example.com
//! host = routeros,logger:secret@gw.example.com
//! host = snmp,sw1.example.com,private
//! age = 90
//! ```
//!
//! `host` is repeatable; its value is `backend,address[,extra-args...]`.
//! `age` is the retention window in days.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Config file location when `-c` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ndplog.conf";

/// Retention window when `age` is not configured.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 180;

/// Fatal configuration problems. These abort the run before any polling
/// and map to exit code 2.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("database URL not configured")]
    MissingDbUrl,

    #[error("unrecognized database URL {0:?}")]
    BadDbUrl(String),

    #[error("invalid age {0:?}: expected integer days")]
    BadAge(String),
}

/// One `host =` entry: which backend to use, the address (or credentials
/// and address) to reach it at, and any backend-specific extras such as an
/// SNMP community string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub backend: String,
    pub host: String,
    pub args: Vec<String>,
}

/// The parsed database URL. Only `sqlite://PATH` is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbUrl {
    pub path: String,
}

impl DbUrl {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let bad = || ConfigError::BadDbUrl(url.to_string());
        let (scheme, rest) = url.split_once("://").ok_or_else(bad)?;
        if scheme != "sqlite" || rest.is_empty() {
            return Err(bad());
        }
        Ok(DbUrl {
            path: rest.to_string(),
        })
    }
}

/// Everything a run needs, loaded once and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbUrl,
    pub hosts: Vec<HostSpec>,
    pub max_age_days: u32,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut db_url = None;
        let mut hosts = Vec::new();
        let mut max_age_days = DEFAULT_MAX_AGE_DAYS;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("Ignoring config line without '=': {:?}", line);
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "db" => db_url = Some(value.to_string()),
                "host" => {
                    let mut fields = value.split(',').map(str::trim).map(str::to_string);
                    let (Some(backend), Some(host)) = (fields.next(), fields.next()) else {
                        tracing::warn!("Ignoring host entry without an address: {:?}", value);
                        continue;
                    };
                    hosts.push(HostSpec {
                        backend,
                        host,
                        args: fields.collect(),
                    });
                }
                "age" => {
                    max_age_days = value
                        .parse()
                        .map_err(|_| ConfigError::BadAge(value.to_string()))?;
                }
                other => tracing::warn!("Unrecognized config key {:?}", other),
            }
        }

        let db = DbUrl::parse(&db_url.ok_or(ConfigError::MissingDbUrl)?)?;
        Ok(Config {
            db,
            hosts,
            max_age_days,
        })
    }
}
