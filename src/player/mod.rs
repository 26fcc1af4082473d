//! Player module - spawns and supervises the external MPV process.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection, spawning and reaping
//! - `control.rs` - Suspend/resume (signals on unix, thread suspension on Windows)
//! - `supervisor.rs` - Session state and the start/pause/resume/kill transitions

mod control;
mod process;
mod supervisor;

pub use control::{ControlError, PlatformControl, ProcessControl};
pub use process::{find_mpv, PlayerHandle, PlayerLauncher, ProcessError};
pub use supervisor::{Ack, SessionSnapshot, Supervisor, SupervisorError};

#[cfg(all(test, unix))]
pub(crate) use supervisor::tests::RecordingControl;
