use super::config::SessionConfig;
use super::stats::{SessionState, SessionStats};
use crate::codec::{default_mime, extension_for};
use crate::encoder::{EncodedChunk, Encoder, EncoderEvent};
use crate::settings::Settings;
use crate::sink::{acquire_sink, ChunkSink, PickerRequest, SinkKind};
use crate::source::VideoSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Mimetype assumed when neither the settings nor the runtime name one
const FALLBACK_MIME: &str = "video/webm";

/// Something the session has to react to
#[derive(Debug)]
pub enum SessionEvent {
    /// `None` once the encoder's event channel is closed
    Encoder(Option<EncoderEvent>),
    /// The captured source finished playing
    SourceEnded,
}

/// Whether the session is still running after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Stopped,
}

/// How a finished session ended
#[derive(Debug, Clone)]
pub struct Completion {
    /// Not stopped by the operator and the source is still playing
    pub restart: bool,
    pub stats: SessionStats,
}

/// One capture from a start command to a finalized output
pub struct RecordingSession {
    encoder: Box<dyn Encoder>,
    events: mpsc::Receiver<EncoderEvent>,
    sink: Option<Box<dyn ChunkSink>>,
    sink_kind: SinkKind,
    source: Arc<dyn VideoSource>,
    ended: watch::Receiver<bool>,
    state: SessionState,
    suggested_name: String,
    extension: String,
    mime_type: String,
    force_stop: bool,
    write_failed: bool,
    started_at: DateTime<Utc>,
    chunks_count: usize,
    bytes_count: u64,
}

impl RecordingSession {
    /// Start a session against the page's video element.
    ///
    /// Returns `Ok(None)` when there is nothing to capture. Any failure while
    /// building the encoder releases the sink and returns an error; no
    /// partial session is left behind.
    pub async fn begin(
        config: &SessionConfig,
        settings: &Settings,
        fallback_name: &str,
    ) -> Result<Option<Self>> {
        let Some(source) = config.page.video() else {
            info!("No capturable video on the page");
            return Ok(None);
        };

        let metadata = config.page.metadata();
        let suggested_name = metadata
            .suggested_name()
            .unwrap_or_else(|| fallback_name.to_string());

        let mut options = settings.encoder_options();
        let mime_type = match &options.mime_type {
            Some(mime) => mime.clone(),
            None => match default_mime(config.probe.as_ref()) {
                Some(mime) => {
                    options.mime_type = Some(mime.clone());
                    mime
                }
                None => FALLBACK_MIME.to_string(),
            },
        };
        let extension = extension_for(&mime_type);

        info!(
            "Starting recording session: {} ({})",
            suggested_name, mime_type
        );

        let request = PickerRequest {
            id: metadata.picker_id(),
            suggested_name: format!("{}.{}", suggested_name, extension),
        };
        let sink = acquire_sink(
            config.picker.as_ref(),
            &request,
            &mime_type,
            Arc::clone(&config.downloads),
        )
        .await;
        let sink_kind = sink.kind();

        let timeslice = match sink_kind {
            SinkKind::Incremental => Some(config.timeslice),
            SinkKind::Buffering => None,
        };

        let built = async {
            let stream = source
                .capture_stream()
                .context("Failed to capture media stream")?;
            let mut encoder = config
                .encoders
                .create(stream, &options)
                .context("Failed to create encoder")?;
            let events = encoder
                .start(timeslice)
                .await
                .context("Failed to start encoder")?;
            Ok::<_, anyhow::Error>((encoder, events))
        }
        .await;

        let (encoder, events) = match built {
            Ok(built) => built,
            Err(e) => {
                if let Err(release) = sink.abort().await {
                    warn!("Failed to release sink: {:#}", release);
                }
                return Err(e);
            }
        };

        let ended = source.ended();

        info!(
            "Recording session started: {} via {} as {} ({:?} sink)",
            request.suggested_name,
            encoder.name(),
            encoder.mime_type(),
            sink_kind
        );

        Ok(Some(Self {
            encoder,
            events,
            sink: Some(sink),
            sink_kind,
            source,
            ended,
            state: SessionState::Recording,
            suggested_name,
            extension,
            mime_type,
            force_stop: false,
            write_failed: false,
            started_at: Utc::now(),
            chunks_count: 0,
            bytes_count: 0,
        }))
    }

    /// Wait for the next encoder event or for the source to end
    pub async fn next_event(&mut self) -> SessionEvent {
        let watch_source = self.state == SessionState::Recording;

        tokio::select! {
            event = self.events.recv() => SessionEvent::Encoder(event),
            _ = wait_for_end(&mut self.ended), if watch_source => SessionEvent::SourceEnded,
        }
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Progress {
        match event {
            SessionEvent::Encoder(Some(EncoderEvent::Started)) => {
                debug!("Encoder started for {}", self.suggested_name);
                Progress::Running
            }
            SessionEvent::Encoder(Some(EncoderEvent::Data(chunk))) => {
                self.write(chunk).await;
                Progress::Running
            }
            SessionEvent::Encoder(Some(EncoderEvent::Stopped)) => {
                info!("Encoder stopped for {}", self.suggested_name);
                Progress::Stopped
            }
            SessionEvent::Encoder(None) => {
                warn!("Encoder went away without a stop event");
                Progress::Stopped
            }
            SessionEvent::SourceEnded => {
                info!("Source ended, stopping {}", self.suggested_name);
                self.request_stop().await;
                Progress::Running
            }
        }
    }

    /// Mark the stop as operator-initiated
    pub fn set_force_stop(&mut self) {
        self.force_stop = true;
    }

    /// Ask the encoder to stop (Recording → Stopping)
    pub async fn request_stop(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }

        self.state = SessionState::Stopping;
        if let Err(e) = self.encoder.stop().await {
            warn!("Failed to stop encoder: {:#}", e);
        }
    }

    /// Stop the encoder and route every remaining chunk until it reports
    /// `Stopped`, giving up after `timeout`
    pub async fn stop_and_drain(&mut self, timeout: std::time::Duration) {
        self.request_stop().await;

        let drained = tokio::time::timeout(timeout, async {
            while let Some(event) = self.events.recv().await {
                match event {
                    EncoderEvent::Data(chunk) => self.write(chunk).await,
                    EncoderEvent::Stopped => break,
                    EncoderEvent::Started => {}
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Encoder did not stop within {:?}, finalizing {} anyway",
                timeout, self.suggested_name
            );
        }
    }

    /// Finalize the sink (Stopping → Idle) and decide about a restart
    pub async fn finish(mut self) -> Completion {
        self.state = SessionState::Idle;

        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.finalize().await {
                error!("Failed to finalize {}: {:#}", self.file_name(), e);
            }
        }

        let restart = !self.force_stop && self.source.is_playing();

        info!(
            "Recording session complete: {} ({} chunks, {} bytes, restart={})",
            self.file_name(),
            self.chunks_count,
            self.bytes_count,
            restart
        );

        Completion {
            restart,
            stats: self.stats(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            state: self.state,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            suggested_name: self.suggested_name.clone(),
            file_name: self.file_name(),
            mime_type: self.mime_type.clone(),
            sink: self.sink_kind,
            chunks_count: self.chunks_count,
            bytes_count: self.bytes_count,
            force_stop: self.force_stop,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.suggested_name, self.extension)
    }

    /// Route one chunk to the sink.
    ///
    /// A failed write aborts the session: the encoder is stopped, later
    /// chunks are dropped and no restart follows.
    async fn write(&mut self, chunk: EncodedChunk) {
        if self.write_failed {
            debug!("Dropping {} bytes after write failure", chunk.len());
            return;
        }

        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        match sink.on_chunk(&chunk).await {
            Ok(()) => {
                if !chunk.is_empty() {
                    self.chunks_count += 1;
                    self.bytes_count += chunk.len() as u64;
                }
            }
            Err(e) => {
                error!("Failed to write chunk, aborting session: {:#}", e);
                self.write_failed = true;
                self.force_stop = true;
                self.request_stop().await;
            }
        }
    }
}

/// Resolves once the watched flag turns `true`; never if the sender is gone
async fn wait_for_end(ended: &mut watch::Receiver<bool>) {
    loop {
        if *ended.borrow_and_update() {
            return;
        }
        if ended.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
