pub mod codec;
pub mod config;
pub mod encoder;
pub mod http;
pub mod messages;
pub mod nats;
pub mod session;
pub mod settings;
pub mod sink;
pub mod source;

pub use codec::{list_supported_options, CapabilityProbe, CodecOption};
pub use config::Config;
pub use encoder::{EncodedChunk, Encoder, EncoderEvent, EncoderFactory};
pub use http::{create_router, AppState};
pub use messages::{InboundMessage, OutboundMessage};
pub use nats::NatsBridge;
pub use session::{
    ControllerHandle, RecordingSession, SessionConfig, SessionController, SessionState,
    SessionStats,
};
pub use settings::{EncoderOptions, Settings, SettingsStore};
pub use sink::{Acquisition, ChunkSink, DestinationPicker, DownloadHandler, SinkKind};
pub use source::{MediaStream, Page, PageMetadata, VideoSource};
