//! Configuration module
//!
//! Settings for the store, the media repository client and the upload worker,
//! read from the environment (and an optional `.env` file).

use std::env;
use std::time::Duration;

const DATABASE_URL: &str = "sqlite://stashup.db?mode=rwc";
const DB_MAX_CONNECTIONS: u32 = 5;
const CHUNK_SIZE_BYTES: u64 = 512 * 1024;
const HTTP_TIMEOUT_SECS: u64 = 60;
const PROGRESS_RATE_PER_SEC: f64 = 4.0;
const POLL_INTERVAL_MS: u64 = 5000;
const STALE_IN_PROGRESS_GRACE_SECS: i64 = 0;
const EDIT_SUMMARY: &str = "Uploaded with stashup";

/// Media repository client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Action API endpoint, e.g. `https://commons.wikimedia.org/w/api.php`
    pub api_url: String,
    /// Entity API endpoint used for image claims
    pub structured_data_api_url: String,
    pub access_token: String,
    pub chunk_size_bytes: u64,
    pub http_timeout_secs: u64,
    pub edit_summary: String,
}

impl ClientConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Settings the upload worker reads.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Prefix of canonical file page URLs, e.g. `https://commons.wikimedia.org/wiki/`
    pub home_url: String,
    pub username: Option<String>,
    pub progress_rate_per_sec: f64,
    pub poll_interval_ms: u64,
    /// Age after which an InProgress record counts as abandoned. 0 = disabled.
    pub stale_in_progress_grace_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            home_url: String::new(),
            username: None,
            progress_rate_per_sec: PROGRESS_RATE_PER_SEC,
            poll_interval_ms: POLL_INTERVAL_MS,
            stale_in_progress_grace_secs: STALE_IN_PROGRESS_GRACE_SECS,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_recovery_enabled(&self) -> bool {
        self.stale_in_progress_grace_secs > 0
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub client: ClientConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Endpoints are only needed for uploading; `validate` enforces them.
        let api_url = lookup("STASHUP_API_URL").unwrap_or_default();
        let structured_data_api_url =
            lookup("STASHUP_STRUCTURED_DATA_API_URL").unwrap_or_default();
        let access_token = lookup("STASHUP_ACCESS_TOKEN").unwrap_or_default();
        let home_url = lookup("STASHUP_HOME_URL").unwrap_or_else(|| derive_home_url(&api_url));

        Ok(Config {
            database_url: lookup("STASHUP_DATABASE_URL")
                .unwrap_or_else(|| DATABASE_URL.to_string()),
            db_max_connections: lookup("STASHUP_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| DB_MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(DB_MAX_CONNECTIONS),
            client: ClientConfig {
                api_url,
                structured_data_api_url,
                access_token,
                chunk_size_bytes: lookup("STASHUP_CHUNK_SIZE_BYTES")
                    .unwrap_or_else(|| CHUNK_SIZE_BYTES.to_string())
                    .parse()
                    .unwrap_or(CHUNK_SIZE_BYTES),
                http_timeout_secs: lookup("STASHUP_HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|| HTTP_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(HTTP_TIMEOUT_SECS),
                edit_summary: lookup("STASHUP_EDIT_SUMMARY")
                    .unwrap_or_else(|| EDIT_SUMMARY.to_string()),
            },
            worker: WorkerConfig {
                home_url,
                username: lookup("STASHUP_USERNAME").filter(|u| !u.trim().is_empty()),
                progress_rate_per_sec: lookup("STASHUP_PROGRESS_RATE_PER_SEC")
                    .unwrap_or_else(|| PROGRESS_RATE_PER_SEC.to_string())
                    .parse()
                    .unwrap_or(PROGRESS_RATE_PER_SEC),
                poll_interval_ms: lookup("STASHUP_POLL_INTERVAL_MS")
                    .unwrap_or_else(|| POLL_INTERVAL_MS.to_string())
                    .parse()
                    .unwrap_or(POLL_INTERVAL_MS),
                stale_in_progress_grace_secs: lookup("STASHUP_STALE_IN_PROGRESS_GRACE_SECS")
                    .unwrap_or_else(|| STALE_IN_PROGRESS_GRACE_SECS.to_string())
                    .parse()
                    .unwrap_or(STALE_IN_PROGRESS_GRACE_SECS),
            },
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "STASHUP_DATABASE_URL must be a valid SQLite connection string"
            ));
        }

        if self.client.access_token.trim().is_empty() {
            return Err(anyhow::anyhow!("STASHUP_ACCESS_TOKEN must be set"));
        }

        for (name, url) in [
            ("STASHUP_API_URL", &self.client.api_url),
            ("STASHUP_STRUCTURED_DATA_API_URL", &self.client.structured_data_api_url),
        ] {
            if url.trim().is_empty() {
                return Err(anyhow::anyhow!("{} must be set", name));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("{} must be an http(s) URL", name));
            }
        }

        if self.client.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "STASHUP_CHUNK_SIZE_BYTES must be greater than 0"
            ));
        }

        let rate = self.worker.progress_rate_per_sec;
        if rate.is_nan() || rate <= 0.0 {
            return Err(anyhow::anyhow!(
                "STASHUP_PROGRESS_RATE_PER_SEC must be greater than 0"
            ));
        }

        if self.worker.stale_in_progress_grace_secs < 0 {
            return Err(anyhow::anyhow!(
                "STASHUP_STALE_IN_PROGRESS_GRACE_SECS cannot be negative"
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!(
                "STASHUP_DB_MAX_CONNECTIONS must be greater than 0"
            ));
        }

        Ok(())
    }
}

/// `https://host/w/api.php` -> `https://host/wiki/`
fn derive_home_url(api_url: &str) -> String {
    let base = match api_url.find("/w/") {
        Some(idx) => &api_url[..idx],
        None => api_url.trim_end_matches('/'),
    };
    format!("{}/wiki/", base)
}
