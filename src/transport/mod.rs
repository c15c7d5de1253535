//! Fragmentation & compression transport adapter.
//!
//! Sits between the sync engines and the host's message transport:
//!
//! ```text
//! outbound: plain message -> zstd (if large) -> fragments (if still large)
//!           -> per-peer send task (backpressure, one fragment per tick)
//! inbound:  fragments -> reassembly (per sender + transfer id, 60 s expiry)
//!           -> decompression -> plain message
//! ```
//!
//! The [`OutboundGate`] holds host traffic for a peer until its initial
//! config snapshot has been sent.

mod compression;
mod fragment;
pub mod frame;
mod gate;
mod inbound;
mod sender;

pub use compression::*;
pub use fragment::*;
pub use frame::{Envelope, FragmentFrame};
pub use gate::*;
pub use inbound::*;
pub use sender::*;
