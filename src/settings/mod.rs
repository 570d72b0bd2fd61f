//! Recording settings and their persistence
//!
//! - `Settings`: the live mapping, seeded from defaults and the store,
//!   updated from the command channel
//! - `SettingsStore`: persisted key-value service (in-memory or JSON file)

mod settings;
mod store;

pub use settings::{
    coerce_positive_int, EncoderOptions, Settings, AUDIO_BITS_PER_SECOND, MIME_TYPE,
    RECORDING_KEYS, VIDEO_BITS_PER_SECOND, VIDEO_KEY_FRAME_INTERVAL,
};
pub use store::{JsonFileStore, MemoryStore, SettingsStore, PERSISTED_KEYS};
