//! Runtime settings resolved from environment variables with defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_LOCAL_STORE: &str = "local-store.json";
pub const DEFAULT_CREDENTIAL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ROW_LIMIT: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub local_store_path: PathBuf,
    pub access_token: Option<String>,
    pub session_file: Option<PathBuf>,
    pub credential_timeout: Duration,
    pub fetch_timeout: Duration,
    pub row_limit: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            local_store_path: PathBuf::from(DEFAULT_LOCAL_STORE),
            access_token: None,
            session_file: None,
            credential_timeout: Duration::from_millis(DEFAULT_CREDENTIAL_TIMEOUT_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let credential_timeout = match get("BURNOUT_CREDENTIAL_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("BURNOUT_CREDENTIAL_TIMEOUT_MS is not a number: {raw}"))?,
            ),
            None => defaults.credential_timeout,
        };
        let fetch_timeout = match get("BURNOUT_FETCH_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("BURNOUT_FETCH_TIMEOUT_MS is not a number: {raw}"))?,
            ),
            None => defaults.fetch_timeout,
        };
        let row_limit = match get("BURNOUT_ROW_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|limit| *limit > 0)
                .with_context(|| format!("BURNOUT_ROW_LIMIT must be a positive integer: {raw}"))?,
            None => defaults.row_limit,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            local_store_path: get("BURNOUT_LOCAL_STORE")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_store_path),
            access_token: get("BURNOUT_ACCESS_TOKEN"),
            session_file: get("BURNOUT_SESSION_FILE").map(PathBuf::from),
            credential_timeout,
            fetch_timeout,
            row_limit,
        })
    }
}
