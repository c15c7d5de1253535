//! Protocol constants.
//!
//! Wire flags and reserved names are fixed by the protocol and MUST NOT be changed.
//! Thresholds and timeouts are the defaults used by [`SyncConfig`](crate::core::SyncConfig).

use std::time::Duration;

// =============================================================================
// PAYLOAD FLAGS
// =============================================================================

/// Payload carries only the entries that changed (merge, do not reset).
pub const FLAG_PARTIAL: u8 = 0x01;

/// Payload is one fragment of a larger payload.
pub const FLAG_FRAGMENT: u8 = 0x02;

/// Payload body is a length-prefixed compressed buffer.
pub const FLAG_COMPRESSED: u8 = 0x04;

// =============================================================================
// RESERVED NAMES
// =============================================================================

/// Section reserved for internal values.
pub const INTERNAL_SECTION: &str = "Internal";

/// Internal key carrying the authority's current version.
pub const KEY_SERVER_VERSION: &str = "serverversion";

/// Internal key carrying the receiver's admin-exemption flag.
pub const KEY_LOCK_EXEMPT: &str = "lockexempt";

/// Suffix of the per-mod route name used for config payloads.
pub const CONFIG_SYNC_ROUTE_SUFFIX: &str = " ConfigSync";

/// Route name used for the version handshake.
pub const VERSION_CHECK_ROUTE: &str = "ServerSync VersionCheck";

/// Version reported when none is configured.
pub const DEFAULT_VERSION: &str = "0.0.0";

// =============================================================================
// SIZES
// =============================================================================

/// Payloads larger than this are compressed before sending.
pub const COMPRESS_MIN_SIZE: usize = 10_000;

/// Payloads larger than this are split into fragments of this size.
pub const FRAGMENT_SLICE_SIZE: usize = 250_000;

/// Fragment header size (flags + transfer id + index + count + slice length).
pub const FRAGMENT_HEADER_SIZE: usize = 1 + 8 + 4 + 4 + 4;

/// Sending pauses while a peer's outbound queue is above this depth.
pub const MAX_SEND_QUEUE: usize = 20_000;

/// Upper bound for a decompressed payload.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// =============================================================================
// TIMING
// =============================================================================

/// A peer whose queue does not drain within this window is disconnected.
pub const SEND_QUEUE_TIMEOUT: Duration = Duration::from_secs(30);

/// Partial fragmented transfers are dropped after this long.
pub const FRAGMENT_EXPIRY: Duration = Duration::from_secs(60);

/// Interval at which the server compares its admin allow-list.
pub const ADMIN_LIST_POLL_INTERVAL: Duration = Duration::from_secs(30);
