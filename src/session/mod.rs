//! Link session management
//!
//! [`SessionSupervisor`] owns the vehicle link and runs the connection
//! lifecycle; [`SessionControl`] is the handle the rest of the bridge uses to
//! stop it, change its target and observe its phase.

mod control;
mod mission;
mod supervisor;

pub use control::{SessionControl, TargetChange};
pub use supervisor::SessionSupervisor;
