//! Recording session management
//!
//! - `RecordingSession`: one capture, from sink selection through encoder
//!   events to the finalized output
//! - `SessionController`: owns the single session slot, reacts to commands
//!   and restarts capture while the source keeps playing
//! - `SessionStats`: snapshot of the active session

mod config;
mod controller;
mod session;
mod stats;

pub use config::{SessionConfig, DRAIN_TIMEOUT, INCREMENTAL_TIMESLICE};
pub use controller::{Command, ControllerHandle, SessionController};
pub use session::{Completion, Progress, RecordingSession, SessionEvent};
pub use stats::{SessionState, SessionStats};
