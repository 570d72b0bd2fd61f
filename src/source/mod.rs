//! Capture sources
//!
//! A `Page` hosts at most one capturable `VideoSource`. The session asks the
//! page for its video and metadata on every start, captures a `MediaStream`
//! from the video, and watches the video's ended signal.

pub mod playlist;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub use playlist::{PlaylistItem, PlaylistPage};

/// Handle to a live media stream that an encoder can consume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    /// Input locator (URL or file path) understood by the encoder
    pub input: String,
    /// Human-readable label for logging
    pub label: String,
}

/// Metadata scraped from the page hosting the video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    /// Stable identifier of the current item (e.g. a video id)
    pub id: Option<String>,
    /// Link to the channel or source that published the item
    pub channel_link: Option<String>,
}

impl PageMetadata {
    /// `"{title} [{id}]"` when title, channel and id are all present
    pub fn suggested_name(&self) -> Option<String> {
        match (&self.title, &self.channel, &self.id) {
            (Some(title), Some(_), Some(id)) if !title.is_empty() && !id.is_empty() => {
                Some(format!("{} [{}]", title.trim(), id))
            }
            _ => None,
        }
    }

    /// Per-source identifier for the destination picker.
    ///
    /// Last path segment of the channel link, without `@`, at most 32 chars.
    pub fn picker_id(&self) -> Option<String> {
        let link = self.channel_link.as_deref()?.trim_end_matches('/');
        let segment = link.rsplit('/').next().unwrap_or(link);
        let id: String = segment.replace('@', "").chars().take(32).collect();

        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}

/// A playing video element
pub trait VideoSource: Send + Sync {
    /// Capture the element's current output as a stream
    fn capture_stream(&self) -> Result<MediaStream>;

    /// Whether playback is still running (not paused and not exhausted)
    fn is_playing(&self) -> bool;

    /// Flips to `true` when the current item ends naturally
    fn ended(&self) -> watch::Receiver<bool>;
}

/// The page hosting the video element
pub trait Page: Send + Sync {
    /// The capturable video element, if any
    fn video(&self) -> Option<Arc<dyn VideoSource>>;

    fn metadata(&self) -> PageMetadata;
}
