use std::sync::Arc;
use std::time::Duration;

use crate::codec::CapabilityProbe;
use crate::encoder::EncoderFactory;
use crate::settings::SettingsStore;
use crate::sink::{DestinationPicker, DownloadHandler};
use crate::source::Page;

/// Flush interval requested from the encoder when writing incrementally
pub const INCREMENTAL_TIMESLICE: Duration = Duration::from_millis(500);

/// How long a superseded or shut-down session may take to deliver its
/// last chunks before it is finalized anyway
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators shared by every session of one controller
#[derive(Clone)]
pub struct SessionConfig {
    /// Page hosting the video element
    pub page: Arc<dyn Page>,

    /// Builds an encoder per session
    pub encoders: Arc<dyn EncoderFactory>,

    /// Runtime codec support
    pub probe: Arc<dyn CapabilityProbe>,

    /// Grants destinations for the incremental sink
    pub picker: Arc<dyn DestinationPicker>,

    /// Receives buffered recordings
    pub downloads: Arc<dyn DownloadHandler>,

    /// Persisted settings
    pub store: Arc<dyn SettingsStore>,

    /// Encoder timeslice for the incremental sink
    pub timeslice: Duration,

    pub drain_timeout: Duration,
}

impl SessionConfig {
    pub fn new(
        page: Arc<dyn Page>,
        encoders: Arc<dyn EncoderFactory>,
        probe: Arc<dyn CapabilityProbe>,
        picker: Arc<dyn DestinationPicker>,
        downloads: Arc<dyn DownloadHandler>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            page,
            encoders,
            probe,
            picker,
            downloads,
            store,
            timeslice: INCREMENTAL_TIMESLICE,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }
}
