//! Where encoded bytes go
//!
//! Two interchangeable sinks behind [`ChunkSink`]:
//! - `IncrementalSink`: positioned writes into a destination acquired
//!   before the session starts; memory use does not grow with the stream
//! - `BufferingSink`: keeps every chunk and hands one download over at the end
//!
//! [`acquire_sink`] prefers the incremental sink and falls back to buffering
//! when no destination can be acquired.

pub mod buffer;
pub mod file;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoder::EncodedChunk;

pub use buffer::{BufferingSink, Download, DownloadHandler, DownloadsDirectory};
pub use file::{
    Acquisition, DenyPicker, DestinationPicker, DirectoryPicker, FileDestination, IncrementalSink,
    PickerRequest, WritableDestination,
};

/// Which sink a session routes its chunks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Incremental,
    Buffering,
}

/// Consumer of encoded chunks
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    /// Accept the next chunk. Empty chunks are ignored.
    async fn on_chunk(&mut self, chunk: &EncodedChunk) -> Result<()>;

    /// Flush and release the output. Consumes the sink so it runs once.
    async fn finalize(self: Box<Self>) -> Result<()>;

    /// Release the output without producing a recording
    async fn abort(self: Box<Self>) -> Result<()>;

    fn kind(&self) -> SinkKind;
}

/// Pick the sink for a new session.
///
/// Refusal or absence of a destination is not an error: the session falls
/// back to buffering.
pub async fn acquire_sink(
    picker: &dyn DestinationPicker,
    request: &PickerRequest,
    mime_type: &str,
    downloads: Arc<dyn DownloadHandler>,
) -> Box<dyn ChunkSink> {
    match picker.acquire(request).await {
        Ok(Acquisition::Acquired(destination)) => {
            info!("Writing incrementally to {}", destination.describe());
            Box::new(IncrementalSink::new(destination))
        }
        Ok(Acquisition::Unavailable) => {
            info!("No destination for {}, buffering in memory", request.suggested_name);
            Box::new(BufferingSink::new(&request.suggested_name, mime_type, downloads))
        }
        Err(e) => {
            warn!("Destination acquisition failed, buffering in memory: {:#}", e);
            Box::new(BufferingSink::new(&request.suggested_name, mime_type, downloads))
        }
    }
}

/// Make a display name safe to use as a file name
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

/// `name.ext` for `n == 0`, otherwise `name (n).ext`
pub fn numbered_file_name(file_name: &str, n: usize) -> String {
    if n == 0 {
        return file_name.to_string();
    }

    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, extension),
        _ => format!("{} ({})", file_name, n),
    }
}
