//! Core types shared by every layer: constants, configuration, errors,
//! session state and the collaborator traits the host implements.

mod config;
pub mod constants;
mod context;
mod error;
mod traits;

pub use config::*;
pub use context::*;
pub use error::*;
pub use traits::*;
