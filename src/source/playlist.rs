use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{MediaStream, Page, PageMetadata, VideoSource};

/// One entry of a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Input URL or path handed to the encoder
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_link: Option<String>,
    /// Playback length; when set the item signals `ended` after this long
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl PlaylistItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            id: None,
            channel: None,
            channel_link: None,
            duration_secs: None,
        }
    }

    fn metadata(&self) -> PageMetadata {
        PageMetadata {
            title: self.title.clone(),
            channel: self.channel.clone(),
            id: self.id.clone(),
            channel_link: self.channel_link.clone(),
        }
    }
}

/// A page whose video element plays an ordered list of inputs.
///
/// Every capture consumes the next item, so a session restarted after an
/// item finishes picks up the following one. Playback counts as running
/// while unplayed items remain.
pub struct PlaylistPage {
    video: Arc<PlaylistVideo>,
}

struct PlaylistVideo {
    items: Vec<PlaylistItem>,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<Playback>,
    ended_tx: watch::Sender<bool>,
}

struct Playback {
    next: usize,
    generation: u64,
}

impl PlaylistPage {
    pub fn new(items: Vec<PlaylistItem>) -> Self {
        info!("Playlist loaded: {} items", items.len());
        let (ended_tx, _) = watch::channel(false);

        Self {
            video: Arc::new(PlaylistVideo {
                items,
                shared: Arc::new(Shared {
                    state: Mutex::new(Playback {
                        next: 0,
                        generation: 0,
                    }),
                    ended_tx,
                }),
            }),
        }
    }

    /// Items not yet captured
    pub fn remaining(&self) -> usize {
        self.video.remaining()
    }
}

impl Page for PlaylistPage {
    fn video(&self) -> Option<Arc<dyn VideoSource>> {
        if self.video.remaining() == 0 {
            return None;
        }
        let video: Arc<dyn VideoSource> = self.video.clone();
        Some(video)
    }

    fn metadata(&self) -> PageMetadata {
        let state = self.video.shared.lock();
        self.video
            .items
            .get(state.next)
            .map(PlaylistItem::metadata)
            .unwrap_or_default()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Playback> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlaylistVideo {
    fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.shared.lock().next)
    }

    fn schedule_end(&self, generation: u64, after: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for playback timer; item ends with its input");
            return;
        };

        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if shared.lock().generation == generation {
                debug!("Playlist item {} reached its duration", generation);
                shared.ended_tx.send_replace(true);
            }
        });
    }
}

impl VideoSource for PlaylistVideo {
    fn capture_stream(&self) -> Result<MediaStream> {
        let (item, generation) = {
            let mut state = self.shared.lock();
            let Some(item) = self.items.get(state.next).cloned() else {
                bail!("Playlist exhausted");
            };
            state.next += 1;
            state.generation += 1;
            (item, state.generation)
        };

        self.shared.ended_tx.send_replace(false);
        if let Some(secs) = item.duration_secs {
            self.schedule_end(generation, Duration::from_secs(secs));
        }

        info!("Capturing playlist item {}: {}", generation, item.url);

        Ok(MediaStream {
            label: item.title.clone().unwrap_or_else(|| item.url.clone()),
            input: item.url,
        })
    }

    fn is_playing(&self) -> bool {
        self.remaining() > 0
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.shared.ended_tx.subscribe()
    }
}
