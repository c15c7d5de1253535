//! Version negotiation
//!
//! Implements:
//! - Dotted numeric version comparison
//! - Named version checks, optionally mirroring a config sync
//! - The per-connection handshake and verdict

mod check;
mod error;
mod negotiator;
#[allow(clippy::module_inception)]
mod version;

pub use check::*;
pub use error::*;
pub use negotiator::*;
pub use version::*;
