use anyhow::Result;
use serde::Deserialize;

use crate::source::PlaylistItem;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub output: OutputConfig,
    pub settings: SettingsConfig,
    #[serde(default)]
    pub playlist: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
    /// Commands arrive on `<prefix>.command`, replies and pushes leave on `<prefix>.event`
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root for incrementally written recordings
    pub directory: String,
    /// Where buffered recordings are saved
    pub downloads_directory: String,
    /// `false` always buffers in memory
    pub use_file_picker: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    pub store_path: String,
}

impl Config {
    /// Built-in defaults, then the config file (if present), then
    /// `STREAM_SAVER__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "stream-saver")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8640)?
            .set_default("nats.enabled", false)?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.subject_prefix", "recorder")?
            .set_default("output.directory", "recordings")?
            .set_default("output.downloads_directory", "downloads")?
            .set_default("output.use_file_picker", true)?
            .set_default("settings.store_path", "stream-saver-settings.json")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STREAM_SAVER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
