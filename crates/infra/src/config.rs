//! Process configuration loaded from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::lock::DEFAULT_LEASE_TTL;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Redis URL; `None` selects the in-process lease table.
    pub redis_url: Option<String>,
    pub lock_ttl: Duration,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let lock_ttl_secs: u64 = parse_or(get("LOCK_TTL_SECS"), "LOCK_TTL_SECS", DEFAULT_LEASE_TTL.as_secs())?;
        if lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "LOCK_TTL_SECS",
                message: "must be at least 1".to_string(),
            });
        }
        let db_max_connections =
            parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => parse("BIND_ADDR", &raw)?,
            None => parse("BIND_ADDR", DEFAULT_BIND_ADDR)?,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            db_max_connections,
            bind_addr,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            lock_ttl: DEFAULT_LEASE_TTL,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("'{raw}': {e}"),
    })
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}
