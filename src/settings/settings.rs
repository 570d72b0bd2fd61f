use serde_json::{Map, Value};
use std::time::Duration;

use super::store::SettingsStore;

pub const AUDIO_BITS_PER_SECOND: &str = "audioBitsPerSecond";
pub const VIDEO_BITS_PER_SECOND: &str = "videoBitsPerSecond";
pub const MIME_TYPE: &str = "mimeType";
pub const VIDEO_KEY_FRAME_INTERVAL: &str = "videoKeyFrameIntervalDuration";

/// Keys the encoder understands, in the order they are seeded
pub const RECORDING_KEYS: &[&str] = &[
    AUDIO_BITS_PER_SECOND,
    VIDEO_BITS_PER_SECOND,
    MIME_TYPE,
    VIDEO_KEY_FRAME_INTERVAL,
];

/// Live recording settings.
///
/// A flat mapping from option name to raw value, as received from the
/// command channel. Values are only coerced when a session takes a
/// snapshot through [`Settings::encoder_options`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
}

/// Encoder configuration derived from [`Settings`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderOptions {
    pub audio_bits_per_second: Option<u64>,
    pub video_bits_per_second: Option<u64>,
    /// `None` means the encoder picks its own default
    pub mime_type: Option<String>,
    pub video_key_frame_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut values = Map::new();
        values.insert(AUDIO_BITS_PER_SECOND.to_string(), Value::from(192_000));
        values.insert(VIDEO_BITS_PER_SECOND.to_string(), Value::from(2_500_000));
        values.insert(MIME_TYPE.to_string(), Value::Null);
        values.insert(VIDEO_KEY_FRAME_INTERVAL.to_string(), Value::from(5));
        Self { values }
    }
}

impl Settings {
    /// Defaults overlaid with whatever the store holds for the recording keys.
    ///
    /// Falsy stored values (null, empty string, zero, false) keep the default.
    pub async fn seed_from(store: &dyn SettingsStore) -> anyhow::Result<Self> {
        let mut settings = Self::default();
        let stored = store.get(RECORDING_KEYS).await?;

        for (key, value) in stored {
            if is_truthy(&value) {
                settings.values.insert(key, value);
            }
        }

        Ok(settings)
    }

    /// Shallow overlay: given keys replace existing ones, others are untouched.
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.values.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Snapshot for one session with every numeric field coerced.
    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            audio_bits_per_second: self.get(AUDIO_BITS_PER_SECOND).and_then(coerce_positive_int),
            video_bits_per_second: self.get(VIDEO_BITS_PER_SECOND).and_then(coerce_positive_int),
            mime_type: self.get(MIME_TYPE).and_then(coerce_mime),
            video_key_frame_interval: self
                .get(VIDEO_KEY_FRAME_INTERVAL)
                .and_then(coerce_positive_int)
                .map(Duration::from_secs),
        }
    }
}

/// Integer-prefix coercion into a positive integer.
///
/// Numbers are truncated; strings parse an optional sign and the leading
/// digits after whitespace. Anything that does not end up positive is `None`.
pub fn coerce_positive_int(value: &Value) -> Option<u64> {
    let parsed = match value {
        Value::Number(number) => {
            if let Some(n) = number.as_i64() {
                Some(n)
            } else {
                number
                    .as_f64()
                    .filter(|f| f.is_finite() && *f < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            }
        }
        Value::String(text) => parse_int_prefix(text),
        _ => None,
    };

    parsed.filter(|n| *n > 0).map(|n| n as u64)
}

fn parse_int_prefix(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let magnitude: i64 = digits.parse().ok()?;

    Some(if negative { -magnitude } else { magnitude })
}

fn coerce_mime(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0 && !n.is_nan()).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
