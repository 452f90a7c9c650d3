use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::sync::backoff::Backoff;
use crate::sync::store::default_db_path;

pub const DEFAULT_API_URL: &str = "https://music.holodex.net/";
const DEFAULT_PENDING_DELETE_TIMEOUT_SECS: u64 = 35 * 60;
const DEFAULT_MAX_RUN_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 30_000;
const DEFAULT_RETRY_MAX_SECS: u64 = 600;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub db_path: PathBuf,
    pub pending_delete_timeout: Duration,
    pub max_run_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = read_string(&lookup, "MUSICDEX_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = read_string(&lookup, "MUSICDEX_TOKEN");
        let user_id = read_string(&lookup, "MUSICDEX_USER_ID");
        let db_path = match read_string(&lookup, "MUSICDEX_DB_PATH") {
            Some(value) => match dirs::home_dir() {
                Some(home) => expand_with_home(&value, &home),
                None => PathBuf::from(value),
            },
            None => default_db_path().context("no default location for the sync database")?,
        };
        let pending_delete_timeout = Duration::from_secs(read_u64_env(
            &lookup,
            "MUSICDEX_PENDING_DELETE_TIMEOUT_SECS",
            DEFAULT_PENDING_DELETE_TIMEOUT_SECS,
        ));
        let max_run_attempts =
            read_u64_env(&lookup, "MUSICDEX_MAX_RUN_ATTEMPTS", DEFAULT_MAX_RUN_ATTEMPTS)
                .min(u64::from(u32::MAX)) as u32;
        let retry_base = Duration::from_millis(read_u64_env(
            &lookup,
            "MUSICDEX_RETRY_BASE_MS",
            DEFAULT_RETRY_BASE_MS,
        ));
        let retry_max = Duration::from_secs(read_u64_env(
            &lookup,
            "MUSICDEX_RETRY_MAX_SECS",
            DEFAULT_RETRY_MAX_SECS,
        ));

        Ok(Self {
            api_url,
            token,
            user_id,
            db_path,
            pending_delete_timeout,
            max_run_attempts,
            retry_base,
            retry_max,
        })
    }

    /// The bearer token, or `None` when the user is signed out. A blank token counts as
    /// signed out.
    pub fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.retry_base, self.retry_max)
    }
}

fn read_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64_env<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}
