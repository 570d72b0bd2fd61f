use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mime::{candidate_mime, generic_pattern, with_container};

/// Video codec candidates as `(token, label)`. The empty token means "no video".
pub const VIDEO_CODECS: &[(&str, &str)] = &[
    ("vp9", "VP9 Video"),
    ("avc1", "H264 Video"),
    ("vp8", "VP8 Video"),
    ("av1", "AV1 Video"),
    ("hev1", "H265 Video"),
    ("", ""),
];

/// Audio codec candidates as `(token, label)`. The empty token means "no audio".
pub const AUDIO_CODECS: &[(&str, &str)] = &[
    ("opus", "Opus Audio"),
    ("pcm", "PCM Audio"),
    ("mp4a", "AAC Audio"),
    ("", ""),
];

/// Container candidates in probe order.
pub const CONTAINERS: &[(&str, &str)] = &[
    ("webm", "WebM"),
    ("ogg", "OGG"),
    ("mp4", "MP4"),
    ("x-matroska", "Matroska"),
];

/// Answers whether the runtime can encode a given mimetype.
pub trait CapabilityProbe: Send + Sync {
    fn is_type_supported(&self, mime: &str) -> bool;
}

impl<F> CapabilityProbe for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_type_supported(&self, mime: &str) -> bool {
        self(mime)
    }
}

/// One user-selectable codec pairing and the containers that accept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecOption {
    /// `(generic pattern, display label)`
    #[serde(rename = "type")]
    pub kind: (String, String),

    /// `(container token, display label)` in probe order
    pub containers: Vec<(String, String)>,
}

impl CodecOption {
    pub fn pattern(&self) -> &str {
        &self.kind.0
    }

    pub fn label(&self) -> &str {
        &self.kind.1
    }

    /// Concrete mimetype for the first supported container
    pub fn default_mime(&self) -> Option<String> {
        self.containers
            .first()
            .map(|(container, _)| with_container(self.pattern(), container))
    }
}

/// Probe every codec/container combination and group the supported ones
/// by codec pair.
///
/// Not cached: capability can change between queries.
pub fn list_supported_options(probe: &dyn CapabilityProbe) -> Vec<CodecOption> {
    let mut output: Vec<CodecOption> = Vec::new();

    for &(video, video_label) in VIDEO_CODECS {
        for &(audio, audio_label) in AUDIO_CODECS {
            if video.is_empty() && audio.is_empty() {
                continue;
            }

            for &(container, container_label) in CONTAINERS {
                let candidate = candidate_mime(video, audio, container);
                if !probe.is_type_supported(&candidate) {
                    continue;
                }

                debug!("Supported: {}", candidate);

                let pattern = generic_pattern(&candidate, container);
                let entry = (container.to_string(), container_label.to_string());

                match output.iter_mut().find(|option| option.kind.0 == pattern) {
                    Some(option) => option.containers.push(entry),
                    None => output.push(CodecOption {
                        kind: (pattern, pair_label(video_label, audio_label)),
                        containers: vec![entry],
                    }),
                }
            }
        }
    }

    output
}

/// Default output mimetype: the first container of the first option.
pub fn default_mime(probe: &dyn CapabilityProbe) -> Option<String> {
    list_supported_options(probe)
        .first()
        .and_then(CodecOption::default_mime)
}

fn pair_label(video_label: &str, audio_label: &str) -> String {
    match (video_label.is_empty(), audio_label.is_empty()) {
        (false, false) => format!("{} + {}", video_label, audio_label),
        (false, true) => video_label.to_string(),
        _ => audio_label.to_string(),
    }
}
