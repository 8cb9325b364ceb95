//! Vehicle Link
//!
//! The transport seam between the session supervisor and the vehicle: a
//! connector opens links to a [`SessionTarget`], a link yields decoded
//! inbound messages and accepts outbound ones.

pub mod encode;
mod mav;
#[cfg(test)]
pub mod mock;
mod target;
mod traits;

pub use encode::{MissionKind, TargetIds};
pub use mav::MavlinkConnector;
pub use target::{SessionTarget, TargetError};
pub use traits::{Inbound, LinkConnector, LinkError, VehicleLink};
