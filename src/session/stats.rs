use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sink::SinkKind;

/// Lifecycle state of a recording session
///
/// Starting is not observable: `RecordingSession::begin` either returns a
/// session already `Recording` or fails without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
}

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Elapsed time in seconds
    pub duration_secs: f64,

    /// Suggested name without extension
    pub suggested_name: String,

    /// `{suggested_name}.{extension}`
    pub file_name: String,

    /// Resolved output mimetype
    pub mime_type: String,

    pub sink: SinkKind,

    /// Non-empty chunks routed to the sink
    pub chunks_count: usize,

    /// Bytes routed to the sink
    pub bytes_count: u64,

    /// Operator asked to stop; no automatic restart
    pub force_stop: bool,
}
