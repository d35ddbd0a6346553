//! Persistence for the relay stores.

pub mod snapshot;

pub use snapshot::{SnapshotFile, files};
