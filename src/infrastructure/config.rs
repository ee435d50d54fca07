use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub metrics: MetricsSettings,
    pub visuals: VisualsSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub editor: EditorSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsSettings {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisualsSettings {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Tile data cache location; in-memory when no directory is set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheSettings {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditorSettings {
    #[serde(default = "default_layout_debounce_ms")]
    pub layout_debounce_ms: u64,
    #[serde(default = "default_metadata_debounce_ms")]
    pub metadata_debounce_ms: u64,
    /// Zero disables auto-refresh.
    #[serde(default)]
    pub auto_refresh_secs: u64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            layout_debounce_ms: default_layout_debounce_ms(),
            metadata_debounce_ms: default_metadata_debounce_ms(),
            auto_refresh_secs: 0,
        }
    }
}

impl EditorSettings {
    pub fn layout_debounce(&self) -> Duration {
        Duration::from_millis(self.layout_debounce_ms)
    }

    pub fn metadata_debounce(&self) -> Duration {
        Duration::from_millis(self.metadata_debounce_ms)
    }

    pub fn auto_refresh(&self) -> Option<Duration> {
        (self.auto_refresh_secs > 0).then(|| Duration::from_secs(self.auto_refresh_secs))
    }
}

fn default_bind() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_layout_debounce_ms() -> u64 {
    350
}

fn default_metadata_debounce_ms() -> u64 {
    400
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load `config/studio.*`, overridden by `STUDIO__SECTION__KEY` environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_from("config/studio")
}

pub fn load_from(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("STUDIO").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
