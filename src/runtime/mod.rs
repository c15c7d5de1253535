//! tokio driver
//!
//! Runs a [`SyncHost`](crate::host::SyncHost) on its own task, fed by a
//! command channel and ticked on a fixed interval.

mod driver;

pub use driver::*;
