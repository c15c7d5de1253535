//! Host integration
//!
//! Implements:
//! - The sync host driving engines, version negotiation and the shared outbox
//! - The admin allow-list watcher
//! - Host events

mod admin;
mod event;
#[allow(clippy::module_inception)]
mod host;

pub use admin::*;
pub use event::*;
pub use host::*;
