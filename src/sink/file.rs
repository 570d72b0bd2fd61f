use anyhow::{Context, Result};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{numbered_file_name, sanitize_file_name, ChunkSink, SinkKind};
use crate::encoder::EncodedChunk;

/// What the session asks the picker for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerRequest {
    /// Stable per-source identifier, used to group destinations
    pub id: Option<String>,
    /// `{name}.{extension}`
    pub suggested_name: String,
}

/// Outcome of asking for a writable destination
pub enum Acquisition {
    Acquired(Box<dyn WritableDestination>),
    Unavailable,
}

/// Grants writable destinations, possibly after asking the operator
#[async_trait::async_trait]
pub trait DestinationPicker: Send + Sync {
    async fn acquire(&self, request: &PickerRequest) -> Result<Acquisition>;
}

/// An open output that accepts positioned writes
#[async_trait::async_trait]
pub trait WritableDestination: Send {
    async fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;

    /// Close and remove the output; nothing was recorded into it
    async fn discard(self: Box<Self>) -> Result<()>;

    fn describe(&self) -> String;
}

/// Picker that always refuses, forcing the buffering sink
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyPicker;

#[async_trait::async_trait]
impl DestinationPicker for DenyPicker {
    async fn acquire(&self, _request: &PickerRequest) -> Result<Acquisition> {
        Ok(Acquisition::Unavailable)
    }
}

/// Creates destinations as `<root>/<id>/<suggested name>`, numbering the
/// name (`name (1).ext`, ...) instead of replacing an existing recording
#[derive(Debug, Clone)]
pub struct DirectoryPicker {
    root: PathBuf,
}

impl DirectoryPicker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl DestinationPicker for DirectoryPicker {
    async fn acquire(&self, request: &PickerRequest) -> Result<Acquisition> {
        let dir = match &request.id {
            Some(id) => self.root.join(sanitize_file_name(id)),
            None => self.root.clone(),
        };

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

        let destination =
            FileDestination::create_unique(&dir, &sanitize_file_name(&request.suggested_name))
                .await?;

        Ok(Acquisition::Acquired(Box::new(destination)))
    }
}

/// A file on local disk
pub struct FileDestination {
    file: File,
    path: PathBuf,
}

impl FileDestination {
    /// Create a new file at `path`. Fails if the file already exists.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_new(&path)
            .await
            .with_context(|| format!("Failed to create output file: {:?}", path))?;

        info!("Opened output file: {}", path.display());
        Ok(Self { file, path })
    }

    /// Create `dir/file_name`, or the first free `dir/name (n).ext`
    pub async fn create_unique(dir: &Path, file_name: &str) -> Result<Self> {
        let mut n = 0;
        loop {
            let path = dir.join(numbered_file_name(file_name, n));
            match open_new(&path).await {
                Ok(file) => {
                    info!("Opened output file: {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create output file: {:?}", path))
                }
            }
        }
    }
}

async fn open_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

#[async_trait::async_trait]
impl WritableDestination for FileDestination {
    async fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(position))
            .await
            .context("Failed to seek output file")?;
        self.file
            .write_all(data)
            .await
            .with_context(|| format!("Failed to write to {:?}", self.path))?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush().await.context("Failed to flush output file")?;
        self.file
            .sync_all()
            .await
            .context("Failed to sync output file")?;

        info!("Closed output file: {}", self.path.display());
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        let Self { file, path } = *self;
        drop(file);

        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove unused output file: {:?}", path))?;

        debug!("Removed unused output file: {}", path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes each chunk at the running offset of its destination
pub struct IncrementalSink {
    destination: Box<dyn WritableDestination>,
    offset: u64,
}

impl IncrementalSink {
    pub fn new(destination: Box<dyn WritableDestination>) -> Self {
        Self {
            destination,
            offset: 0,
        }
    }
}

#[async_trait::async_trait]
impl ChunkSink for IncrementalSink {
    async fn on_chunk(&mut self, chunk: &EncodedChunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        self.destination.write_at(self.offset, &chunk.data).await?;
        self.offset += chunk.len() as u64;

        debug!(
            "Wrote {} bytes at {}ms (offset now {})",
            chunk.len(),
            chunk.timestamp_ms,
            self.offset
        );
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> Result<()> {
        info!("Finalizing incremental sink after {} bytes", self.offset);
        self.destination.close().await
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        debug!("Discarding unused destination {}", self.destination.describe());
        self.destination.discard().await
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Incremental
    }
}
