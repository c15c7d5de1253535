//! Persisted settings
//!
//! Implements:
//! - The settings store interface, in memory and as a TOML file
//! - Loading stored values into a config sync
//! - Persisting values, redirected to the local override while locked

mod error;
mod persist;
mod store;

pub use error::*;
pub use persist::*;
pub use store::*;
