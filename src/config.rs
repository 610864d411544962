use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// NYT Books API key
    pub nyt_api_key: String,

    /// NYT Books API base URL
    #[serde(default = "default_nyt_api_url")]
    pub nyt_api_url: String,

    /// Book lookup (Apple Books search) endpoint
    #[serde(default = "default_lookup_api_url")]
    pub lookup_api_url: String,

    /// Bestseller list to track
    #[serde(default = "default_list_name")]
    pub list_name: String,

    /// Root directory of the local blob store
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Redis connection URL; lookup caching is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Attempts per lookup call before a row is marked absent
    #[serde(default = "default_lookup_max_attempts")]
    pub lookup_max_attempts: u32,

    /// Initial lookup backoff in milliseconds, doubled per attempt
    #[serde(default = "default_lookup_backoff_ms")]
    pub lookup_backoff_ms: u64,

    /// Attempts per historical list fetch before the week is skipped
    #[serde(default = "default_list_max_attempts")]
    pub list_max_attempts: u32,

    /// Initial list backoff in milliseconds, doubled per attempt
    #[serde(default = "default_list_backoff_ms")]
    pub list_backoff_ms: u64,

    /// Weeks fetched by a historical backfill
    #[serde(default = "default_history_weeks_back")]
    pub history_weeks_back: u32,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_nyt_api_url() -> String {
    "https://api.nytimes.com/svc/books/v3".to_string()
}

fn default_lookup_api_url() -> String {
    "https://itunes.apple.com/search".to_string()
}

fn default_list_name() -> String {
    "hardcover-fiction".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_lookup_max_attempts() -> u32 {
    4
}

fn default_lookup_backoff_ms() -> u64 {
    500
}

fn default_list_max_attempts() -> u32 {
    8
}

fn default_list_backoff_ms() -> u64 {
    5000
}

fn default_history_weeks_back() -> u32 {
    26
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.list_name.trim().is_empty() {
            anyhow::bail!("LIST_NAME must not be empty");
        }
        if self.lookup_max_attempts == 0 {
            anyhow::bail!("LOOKUP_MAX_ATTEMPTS must be >= 1");
        }
        if self.list_max_attempts == 0 {
            anyhow::bail!("LIST_MAX_ATTEMPTS must be >= 1");
        }
        Ok(())
    }

    pub fn lookup_backoff(&self) -> Duration {
        Duration::from_millis(self.lookup_backoff_ms)
    }

    pub fn list_backoff(&self) -> Duration {
        Duration::from_millis(self.list_backoff_ms)
    }

    /// Minimal configuration for tests and ephemeral runs
    pub fn for_testing(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            nyt_api_key: "test_key".to_string(),
            nyt_api_url: default_nyt_api_url(),
            lookup_api_url: default_lookup_api_url(),
            list_name: default_list_name(),
            storage_root: storage_root.into(),
            redis_url: None,
            lookup_max_attempts: 3,
            lookup_backoff_ms: 0,
            list_max_attempts: 3,
            list_backoff_ms: 0,
            history_weeks_back: 4,
            host: default_host(),
            port: default_port(),
        }
    }
}
