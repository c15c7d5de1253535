//! Wire codec for setting values.
//!
//! Values are encoded with a self-describing type descriptor per entry so a
//! receiver can detect schema drift before applying anything.

mod entry;
mod error;
mod schema;
mod text;
mod value;
pub mod wire;

pub use entry::*;
pub use error::*;
pub use schema::*;
pub use value::*;
pub use wire::{WireReader, WireWriter};
