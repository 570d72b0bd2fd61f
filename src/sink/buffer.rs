use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use super::{numbered_file_name, sanitize_file_name, ChunkSink, SinkKind};
use crate::encoder::EncodedChunk;

/// A finished recording ready to hand to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Delivers finished downloads
#[async_trait::async_trait]
pub trait DownloadHandler: Send + Sync {
    async fn deliver(&self, download: Download) -> Result<()>;
}

/// Saves downloads into a directory, never overwriting an existing file
#[derive(Debug, Clone)]
pub struct DownloadsDirectory {
    dir: PathBuf,
}

impl DownloadsDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
    async fn free_path(&self, file_name: &str) -> PathBuf {
        let mut n = 0;
        loop {
            let candidate = self.dir.join(numbered_file_name(file_name, n));
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[async_trait::async_trait]
impl DownloadHandler for DownloadsDirectory {
    async fn deliver(&self, download: Download) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create downloads directory: {:?}", self.dir))?;

        let path = self.free_path(&sanitize_file_name(&download.file_name)).await;
        fs::write(&path, &download.data)
            .await
            .with_context(|| format!("Failed to save download: {:?}", path))?;

        info!(
            "Saved download {} ({}, {} bytes)",
            path.display(),
            download.mime_type,
            download.data.len()
        );
        Ok(())
    }
}

/// Keeps every chunk in memory until the session ends
pub struct BufferingSink {
    chunks: Vec<Vec<u8>>,
    file_name: String,
    mime_type: String,
    downloads: Arc<dyn DownloadHandler>,
}

impl BufferingSink {
    pub fn new(file_name: &str, mime_type: &str, downloads: Arc<dyn DownloadHandler>) -> Self {
        Self {
            chunks: Vec::new(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            downloads,
        }
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

#[async_trait::async_trait]
impl ChunkSink for BufferingSink {
    async fn on_chunk(&mut self, chunk: &EncodedChunk) -> Result<()> {
        if !chunk.is_empty() {
            self.chunks.push(chunk.data.clone());
        }
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> Result<()> {
        let Self {
            chunks,
            file_name,
            mime_type,
            downloads,
        } = *self;

        let data = chunks.concat();
        info!(
            "Finalizing buffered recording {} ({} chunks, {} bytes)",
            file_name,
            chunks.len(),
            data.len()
        );

        downloads
            .deliver(Download {
                file_name,
                mime_type,
                data,
            })
            .await
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Buffering
    }
}
