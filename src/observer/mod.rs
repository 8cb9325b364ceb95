//! Observer Interface
//!
//! - `hub`: in-process fan-out of snapshots and events
//! - `router`: dispatches observer requests to the command gateway or the
//!   session control
//! - `server`: TCP surface speaking length-prefixed JSON frames

mod hub;
mod router;
mod server;

pub use hub::ObserverHub;
pub use router::RequestRouter;
pub use server::ObserverServer;
