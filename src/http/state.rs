use crate::session::ControllerHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Client of the process-wide session controller
    pub controller: ControllerHandle,
}

impl AppState {
    pub fn new(controller: ControllerHandle) -> Self {
        Self { controller }
    }
}
