pub mod catalog;
pub mod mime;

pub use catalog::{
    default_mime, list_supported_options, CapabilityProbe, CodecOption, AUDIO_CODECS, CONTAINERS,
    VIDEO_CODECS,
};
pub use mime::extension_for;
