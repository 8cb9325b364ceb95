//! Command lifecycle for the vehicle
//!
//! This module handles:
//! - Parsing and validating observer command requests
//! - Queuing encoded commands for the session supervisor
//! - Tracking commands until they are acknowledged, expire or are orphaned
//! - Reporting every outcome to observers

mod gateway;
mod report;
mod request;
mod timeout;
mod tracker;

pub use gateway::{CommandGateway, CommandReply, Outbound, OutboundFrame, OUTBOUND_QUEUE};
pub use report::CommandReporter;
#[cfg(test)]
pub use request::VehicleCommand;
pub use timeout::AckTimeoutSweeper;
pub use tracker::{command_name, AckResult, CommandKey, CommandTracker};
