use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Keys that survive restarts: the recording keys plus the UI selections
pub const PERSISTED_KEYS: &[&str] = &[
    "audioBitsPerSecond",
    "videoBitsPerSecond",
    "mimeType",
    "videoKeyFrameIntervalDuration",
    "availableMetadataIndex",
    "chosenContainer",
];

/// Persistent key-value settings service
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    /// Values for the requested keys; absent keys are simply missing
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Write every entry, replacing previous values
    async fn set(&self, values: Map<String, Value>) -> Result<()>;
}

/// In-memory store, mostly for tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let values = self.values.lock().await;
        Ok(pick(&values, keys))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<()> {
        let mut values = self.values.lock().await;
        values.extend(entries);
        Ok(())
    }
}

/// Store backed by a JSON object on disk. A missing file reads as empty.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Settings store: {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse settings file: {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read settings file: {:?}", self.path))
            }
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let _guard = self.lock.lock().await;
        let values = self.load().await?;
        Ok(pick(&values, keys))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.extend(entries);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create settings directory")?;
            }
        }

        let json = serde_json::to_vec_pretty(&values)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write settings file: {:?}", self.path))?;

        debug!("Persisted {} settings to {}", values.len(), self.path.display());
        Ok(())
    }
}

fn pick(values: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}
