//! Engine notifications and receive reports.

use crate::codec::CodecError;
use crate::registry::{CustomValueHandle, SettingHandle};

/// Change notifications emitted by a [`ConfigSync`](super::ConfigSync).
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A setting's live value changed.
    SettingChanged(SettingHandle),
    /// A custom value's live value changed.
    CustomValueChanged(CustomValueHandle),
    /// The authority role changed.
    AuthorityChanged {
        /// Whether this process is now the source of truth.
        source_of_truth: bool,
    },
    /// A setting became read-only or writable.
    WritabilityChanged {
        /// The setting.
        handle: SettingHandle,
        /// New read-only state.
        read_only: bool,
    },
}

/// Why an inbound entry was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No synchronized setting or custom value has this identity.
    UnknownEntry,
    /// The entry did not match the registered type or struct schema.
    Codec(CodecError),
}

/// An inbound entry that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// Section of the entry.
    pub section: String,
    /// Key of the entry.
    pub key: String,
    /// Reason it was skipped.
    pub reason: SkipReason,
}

/// Summary of one applied payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyReport {
    /// Whether the payload was partial.
    pub partial: bool,
    /// Number of settings applied.
    pub settings: usize,
    /// Number of custom values applied.
    pub custom_values: usize,
    /// Entries skipped.
    pub skipped: Vec<SkippedEntry>,
    /// Set when an unreadable entry made the whole payload unusable.
    pub aborted: Option<CodecError>,
}

/// Result of handing an inbound message to an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// Locked server ignored a non-admin sender.
    Rejected,
    /// A fragment was stored; the transfer is not complete yet.
    Incomplete,
    /// The payload was processed.
    Applied(ApplyReport),
}
