//! Telemetry State Store
//!
//! Holds the canonical [`TelemetryState`](gcs_shared::TelemetryState) of the
//! session behind one lock, together with the dirty flag the snapshot
//! publisher drains.

mod store;

pub use store::TelemetryStore;
