//! Setting registry.
//!
//! Holds the named, typed settings and internal custom values an engine
//! synchronizes, their local overrides, and the locking rules that decide
//! which of them a subordinate process may still edit.

mod error;
#[allow(clippy::module_inception)]
mod registry;
mod setting;

pub use error::*;
pub use registry::*;
pub use setting::*;
