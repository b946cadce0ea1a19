use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub app_port: u16,
    pub app_host: String,
    pub storage: StorageSettings,
    pub model: ModelSettings,
    pub retention: RetentionSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    /// Seed the default personas when the preset collection is empty
    #[serde(default = "default_true")]
    pub seed_default_presets: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelSettings {
    /// OpenAI-compatible server root, e.g. http://localhost:1234
    pub base_url: String,
    /// Model id; the first model the server lists is used when unset
    pub model: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// A turn fails when no fragment arrives within this window
    pub idle_timeout_secs: u64,
    /// Cap on prior messages sent as context; full history when unset
    pub context_messages: Option<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RetentionSettings {
    /// Conversations idle for longer are deleted; never when unset
    pub max_age_days: Option<u32>,
    pub cleanup_interval_hours: u64,
    /// Delay before the next run when a sweep could not run at all
    pub retry_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

impl ModelSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    // Base url without trailing slash: http://<host>:<port>
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Shortest pause between two sweeps or policy retries
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl RetentionSettings {
    /// Never below `MIN_SWEEP_INTERVAL`, so a zero in the config cannot
    /// turn the sweeper into a busy loop.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.saturating_mul(60 * 60)).max(MIN_SWEEP_INTERVAL)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs).max(MIN_SWEEP_INTERVAL)
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(),
            model: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
            idle_timeout_secs: 60,
            context_messages: None,
        }
    }
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_days: Some(30),
            cleanup_interval_hours: 24,
            retry_interval_secs: 60 * 60,
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = config::Config::builder()
        .set_default("app_host", "127.0.0.1")?
        .set_default("app_port", 8000)?
        .set_default("storage.data_dir", "data")?
        .set_default("model.base_url", "http://localhost:1234")?
        .set_default("model.connect_timeout_secs", 5)?
        .set_default("model.request_timeout_secs", 60)?
        .set_default("model.idle_timeout_secs", 60)?
        .set_default("retention.cleanup_interval_hours", 24)?
        .set_default("retention.retry_interval_secs", 3600)?
        // configuration.yaml / .json / .toml next to the binary's working dir
        .add_source(config::File::with_name("configuration").required(false))
        // APP__MODEL__BASE_URL=http://gpu-box:1234 overrides model.base_url
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}
