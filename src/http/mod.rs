//! HTTP API for external control
//!
//! - POST /message - Raw channel message (`{"action": ...}`)
//! - POST /record/start - Start (or restart) recording
//! - POST /record/stop - Stop recording
//! - GET /record/running - Whether a session is active
//! - GET /record/status - Stats of the active session
//! - GET /codecs - Supported codec options
//! - PUT /settings - Merge settings for the next session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
