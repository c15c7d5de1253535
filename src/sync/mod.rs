//! Sync protocol layer
//!
//! Implements:
//! - Authority roles (authoritative / subordinate) per mod
//! - Full and partial payload application
//! - Locking and admin exemption
//! - Snapshots for connecting peers

mod engine;
mod event;

pub use engine::*;
pub use event::*;
