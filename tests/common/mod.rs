// Test doubles for driving a session controller without ffmpeg or a disk
//
// Every fake records what it was asked to do so tests can assert on the
// order of side effects.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_saver::encoder::{EncodedChunk, Encoder, EncoderEvent, EncoderFactory};
use stream_saver::settings::{EncoderOptions, MemoryStore};
use stream_saver::sink::{
    Acquisition, DestinationPicker, Download, DownloadHandler, PickerRequest, WritableDestination,
};
use stream_saver::source::{MediaStream, Page, PageMetadata, VideoSource};
use stream_saver::{OutboundMessage, SessionConfig};
use tokio::sync::{broadcast, mpsc, watch};

pub const WEBM_VP9_OPUS: &str = r#"video/webm; codecs="vp9","opus""#;

/// Supports VP9 + Opus in WebM and Matroska, H264 + AAC in MP4
pub fn desktop_probe(mime: &str) -> bool {
    matches!(
        mime,
        r#"video/webm; codecs="vp9","opus""#
            | r#"video/x-matroska; codecs="vp9","opus""#
            | r#"video/mp4; codecs="avc1","mp4a""#
    )
}

pub fn no_support(_mime: &str) -> bool {
    false
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Default)]
struct EncoderLog {
    options: Vec<EncoderOptions>,
    streams: Vec<MediaStream>,
    timeslices: Vec<Option<Duration>>,
    senders: Vec<mpsc::Sender<EncoderEvent>>,
    stops: usize,
}

/// Builds fake encoders whose events are pushed by the test
#[derive(Default)]
pub struct FakeEncoders {
    log: Arc<Mutex<EncoderLog>>,
    fail_create: AtomicBool,
    final_chunk: Mutex<Option<Vec<u8>>>,
}

impl FakeEncoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Every encoder flushes this chunk when asked to stop, before `Stopped`
    pub fn flush_on_stop(&self, data: &[u8]) {
        *self.final_chunk.lock().unwrap() = Some(data.to_vec());
    }

    /// Encoders started so far
    pub fn started(&self) -> usize {
        self.log.lock().unwrap().senders.len()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn options(&self, index: usize) -> EncoderOptions {
        self.log.lock().unwrap().options[index].clone()
    }

    pub fn stream(&self, index: usize) -> MediaStream {
        self.log.lock().unwrap().streams[index].clone()
    }

    pub fn timeslice(&self, index: usize) -> Option<Duration> {
        self.log.lock().unwrap().timeslices[index]
    }

    /// Push a data chunk from encoder `index`
    pub async fn emit(&self, index: usize, data: &[u8]) {
        self.send(index, EncoderEvent::Data(EncodedChunk::new(data.to_vec(), 0)))
            .await;
    }

    pub async fn send(&self, index: usize, event: EncoderEvent) {
        let sender = self.log.lock().unwrap().senders[index].clone();
        sender.send(event).await.unwrap();
    }
}

impl EncoderFactory for FakeEncoders {
    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("Unsupported configuration");
        }

        let mut log = self.log.lock().unwrap();
        log.options.push(options.clone());
        log.streams.push(stream);

        Ok(Box::new(FakeEncoder {
            log: Arc::clone(&self.log),
            tx: None,
            final_chunk: self.final_chunk.lock().unwrap().clone(),
            mime_type: options.mime_type.clone().unwrap_or_default(),
        }))
    }
}

struct FakeEncoder {
    log: Arc<Mutex<EncoderLog>>,
    tx: Option<mpsc::Sender<EncoderEvent>>,
    final_chunk: Option<Vec<u8>>,
    mime_type: String,
}

#[async_trait::async_trait]
impl Encoder for FakeEncoder {
    async fn start(&mut self, timeslice: Option<Duration>) -> Result<mpsc::Receiver<EncoderEvent>> {
        let (tx, rx) = mpsc::channel(64);
        tx.send(EncoderEvent::Started).await?;

        let mut log = self.log.lock().unwrap();
        log.timeslices.push(timeslice);
        log.senders.push(tx.clone());
        drop(log);

        self.tx = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.log.lock().unwrap().stops += 1;

        let tx = self.tx.take().ok_or_else(|| anyhow!("Encoder not started"))?;
        if let Some(data) = self.final_chunk.take() {
            tx.send(EncoderEvent::Data(EncodedChunk::new(data, 0))).await?;
        }
        tx.send(EncoderEvent::Stopped).await?;
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Page and video
// ============================================================================

pub struct FakeVideo {
    playing: AtomicBool,
    fail_capture: AtomicBool,
    captures: AtomicUsize,
    ended_tx: watch::Sender<bool>,
}

impl FakeVideo {
    pub fn new() -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            playing: AtomicBool::new(true),
            fail_capture: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
            ended_tx,
        }
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    /// Current item finished playing
    pub fn end(&self) {
        self.ended_tx.send_replace(true);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl VideoSource for FakeVideo {
    fn capture_stream(&self) -> Result<MediaStream> {
        if self.fail_capture.load(Ordering::SeqCst) {
            bail!("Stream is not capturable");
        }

        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        self.ended_tx.send_replace(false);
        Ok(MediaStream {
            input: format!("fake://item/{}", n),
            label: format!("item {}", n),
        })
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }
}

pub struct FakePage {
    video: Mutex<Option<Arc<FakeVideo>>>,
    metadata: Mutex<PageMetadata>,
}

impl FakePage {
    pub fn new(video: Option<Arc<FakeVideo>>) -> Self {
        Self {
            video: Mutex::new(video),
            metadata: Mutex::new(PageMetadata::default()),
        }
    }

    pub fn set_metadata(&self, metadata: PageMetadata) {
        *self.metadata.lock().unwrap() = metadata;
    }
}

impl Page for FakePage {
    fn video(&self) -> Option<Arc<dyn VideoSource>> {
        let video: Arc<dyn VideoSource> = self.video.lock().unwrap().clone()?;
        Some(video)
    }

    fn metadata(&self) -> PageMetadata {
        self.metadata.lock().unwrap().clone()
    }
}

// ============================================================================
// Destinations and downloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    Grant,
    Refuse,
    Fail,
    /// Grant destinations whose writes fail
    GrantBroken,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    pub name: String,
    pub data: Vec<u8>,
    pub closed: bool,
    pub discarded: bool,
}

#[derive(Default)]
struct PickerLog {
    requests: Vec<PickerRequest>,
    files: Vec<MemoryFile>,
    events: Vec<String>,
}

/// Grants in-memory destinations and logs every open, write and close
pub struct MemoryPicker {
    mode: Mutex<PickerMode>,
    log: Arc<Mutex<PickerLog>>,
}

impl MemoryPicker {
    pub fn new(mode: PickerMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            log: Arc::new(Mutex::new(PickerLog::default())),
        }
    }

    pub fn set_mode(&self, mode: PickerMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn requests(&self) -> Vec<PickerRequest> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn files(&self) -> Vec<MemoryFile> {
        self.log.lock().unwrap().files.clone()
    }

    /// `open:N`, `write:N`, `close:N`, `discard:N` in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }
}

#[async_trait::async_trait]
impl DestinationPicker for MemoryPicker {
    async fn acquire(&self, request: &PickerRequest) -> Result<Acquisition> {
        let mode = *self.mode.lock().unwrap();
        let mut log = self.log.lock().unwrap();
        log.requests.push(request.clone());

        match mode {
            PickerMode::Refuse => Ok(Acquisition::Unavailable),
            PickerMode::Fail => bail!("Picker crashed"),
            PickerMode::Grant | PickerMode::GrantBroken => {
                let index = log.files.len();
                log.files.push(MemoryFile {
                    name: request.suggested_name.clone(),
                    ..Default::default()
                });
                log.events.push(format!("open:{}", index));

                Ok(Acquisition::Acquired(Box::new(MemoryDestination {
                    log: Arc::clone(&self.log),
                    index,
                    broken: mode == PickerMode::GrantBroken,
                })))
            }
        }
    }
}

struct MemoryDestination {
    log: Arc<Mutex<PickerLog>>,
    index: usize,
    broken: bool,
}

#[async_trait::async_trait]
impl WritableDestination for MemoryDestination {
    async fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        if self.broken {
            bail!("Disk full");
        }

        let mut log = self.log.lock().unwrap();
        let file = &mut log.files[self.index];
        let position = position as usize;
        if file.data.len() < position + data.len() {
            file.data.resize(position + data.len(), 0);
        }
        file.data[position..position + data.len()].copy_from_slice(data);
        log.events.push(format!("write:{}", self.index));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.files[self.index].closed = true;
        log.events.push(format!("close:{}", self.index));
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.files[self.index].discarded = true;
        log.events.push(format!("discard:{}", self.index));
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory file {}", self.index)
    }
}

/// Collects delivered downloads
#[derive(Default)]
pub struct RecordingDownloads {
    downloads: Mutex<Vec<Download>>,
}

impl RecordingDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<Download> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DownloadHandler for RecordingDownloads {
    async fn deliver(&self, download: Download) -> Result<()> {
        self.downloads.lock().unwrap().push(download);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// All fakes wired into one session config
pub struct Harness {
    pub page: Arc<FakePage>,
    pub video: Arc<FakeVideo>,
    pub encoders: Arc<FakeEncoders>,
    pub picker: Arc<MemoryPicker>,
    pub downloads: Arc<RecordingDownloads>,
    pub store: Arc<MemoryStore>,
    probe: fn(&str) -> bool,
}

impl Harness {
    pub fn new(mode: PickerMode) -> Self {
        let video = Arc::new(FakeVideo::new());
        Self {
            page: Arc::new(FakePage::new(Some(Arc::clone(&video)))),
            video,
            encoders: Arc::new(FakeEncoders::new()),
            picker: Arc::new(MemoryPicker::new(mode)),
            downloads: Arc::new(RecordingDownloads::new()),
            store: Arc::new(MemoryStore::new()),
            probe: desktop_probe,
        }
    }

    /// A page without any video element
    pub fn without_video(mode: PickerMode) -> Self {
        Self {
            page: Arc::new(FakePage::new(None)),
            ..Self::new(mode)
        }
    }

    pub fn with_probe(mut self, probe: fn(&str) -> bool) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(
            self.page.clone(),
            self.encoders.clone(),
            Arc::new(self.probe),
            self.picker.clone(),
            self.downloads.clone(),
            self.store.clone(),
        );
        config.drain_timeout = Duration::from_secs(2);
        config
    }
}

/// Wait for the next `running` push and check its value
pub async fn expect_running(rx: &mut broadcast::Receiver<OutboundMessage>, expected: bool) {
    let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a running push")
        .expect("controller events closed");

    assert_eq!(message, OutboundMessage::Running(expected));
}

/// Assert that no push arrives for a short while
pub async fn expect_quiet(rx: &mut broadcast::Receiver<OutboundMessage>) {
    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "unexpected push: {:?}", result);
}
