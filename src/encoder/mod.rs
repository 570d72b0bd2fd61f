pub mod ffmpeg;

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::settings::EncoderOptions;
use crate::source::MediaStream;

pub use ffmpeg::{find_ffmpeg, FfmpegEncoder, FfmpegEncoderFactory, FfmpegProbe};

/// A timestamped piece of encoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    /// Milliseconds since the encoder started
    pub timestamp_ms: u64,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self { data, timestamp_ms }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lifecycle and output events, delivered in production order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    Started,
    Data(EncodedChunk),
    /// Emitted exactly once, after the last `Data`
    Stopped,
}

/// Encoder turning a live media stream into container bytes
///
/// Implementations:
/// - ffmpeg subprocess (`FfmpegEncoder`)
/// - test doubles driving events by hand
#[async_trait::async_trait]
pub trait Encoder: Send {
    /// Start encoding.
    ///
    /// With a timeslice, output is flushed as a chunk at least that often;
    /// without one the encoder picks its own cadence.
    async fn start(&mut self, timeslice: Option<Duration>) -> Result<mpsc::Receiver<EncoderEvent>>;

    /// Ask the encoder to stop. Chunks already produced are still delivered,
    /// then `Stopped` follows.
    async fn stop(&mut self) -> Result<()>;

    /// Resolved output mimetype
    fn mime_type(&self) -> &str;

    /// Encoder name for logging
    fn name(&self) -> &str;
}

/// Builds encoders against a captured stream
pub trait EncoderFactory: Send + Sync {
    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>>;
}
