//! Fragmentation and reassembly.
//!
//! Messages larger than the slice size are split into numbered fragments that
//! share a transfer id. The receiver collects them per `(sender, transfer id)`
//! in any order and rebuilds the message once every index has arrived.
//! Incomplete transfers are dropped after the expiry window.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::frame::FragmentFrame;
use crate::core::PeerId;

/// Errors from fragment reassembly. Each one drops the offending fragment only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    /// A fragment declared zero fragments or an index past the count.
    #[error("fragment index {index} out of range for count {count}")]
    IndexOutOfRange {
        /// Declared index.
        index: u32,
        /// Declared count.
        count: u32,
    },

    /// A fragment's count disagrees with earlier fragments of the same transfer.
    #[error("fragment count changed from {expected} to {received} in transfer {transfer_id}")]
    CountMismatch {
        /// Transfer id.
        transfer_id: u64,
        /// Count from the first fragment.
        expected: u32,
        /// Count on this fragment.
        received: u32,
    },

    /// The same index arrived twice.
    #[error("duplicate fragment {index} in transfer {transfer_id}")]
    Duplicate {
        /// Transfer id.
        transfer_id: u64,
        /// Repeated index.
        index: u32,
    },

    /// The transfer grew past the size limit.
    #[error("transfer {transfer_id} exceeds {limit} bytes")]
    TooLarge {
        /// Transfer id.
        transfer_id: u64,
        /// Byte limit.
        limit: usize,
    },
}

/// Number of fragments needed for `len` bytes.
pub fn fragment_count(len: usize, slice_size: usize) -> usize {
    len.div_ceil(slice_size.max(1)).max(1)
}

/// Split `message` into encoded fragment envelopes.
pub fn fragment_message(message: &[u8], transfer_id: u64, slice_size: usize) -> Vec<Vec<u8>> {
    let slice_size = slice_size.max(1);
    let count = fragment_count(message.len(), slice_size) as u32;
    message
        .chunks(slice_size)
        .enumerate()
        .map(|(index, slice)| {
            FragmentFrame {
                transfer_id,
                index: index as u32,
                count,
                slice,
            }
            .encode()
        })
        .collect()
}

#[derive(Debug)]
struct PendingTransfer {
    count: u32,
    fragments: BTreeMap<u32, Vec<u8>>,
    size: usize,
    expires_at: Instant,
}

/// Inbound reassembly cache.
#[derive(Debug)]
pub struct FragmentAssembler {
    pending: HashMap<(PeerId, u64), PendingTransfer>,
    expiry: Duration,
    max_size: usize,
}

impl FragmentAssembler {
    /// Create an assembler.
    pub fn new(expiry: Duration, max_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            expiry,
            max_size,
        }
    }

    /// Number of incomplete transfers.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Add a fragment from `sender`.
    ///
    /// Returns the rebuilt message when this fragment completes the transfer.
    pub fn insert_at(
        &mut self,
        sender: PeerId,
        frame: &FragmentFrame<'_>,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        let transfer_id = frame.transfer_id;
        if frame.count == 0 || frame.index >= frame.count {
            return Err(FragmentError::IndexOutOfRange {
                index: frame.index,
                count: frame.count,
            });
        }

        let key = (sender, transfer_id);
        let transfer = self.pending.entry(key).or_insert_with(|| PendingTransfer {
            count: frame.count,
            fragments: BTreeMap::new(),
            size: 0,
            expires_at: now + self.expiry,
        });

        if transfer.count != frame.count {
            return Err(FragmentError::CountMismatch {
                transfer_id,
                expected: transfer.count,
                received: frame.count,
            });
        }
        if transfer.fragments.contains_key(&frame.index) {
            return Err(FragmentError::Duplicate {
                transfer_id,
                index: frame.index,
            });
        }
        if transfer.size + frame.slice.len() > self.max_size {
            self.pending.remove(&key);
            return Err(FragmentError::TooLarge {
                transfer_id,
                limit: self.max_size,
            });
        }

        transfer.size += frame.slice.len();
        transfer.fragments.insert(frame.index, frame.slice.to_vec());
        if transfer.fragments.len() < transfer.count as usize {
            return Ok(None);
        }

        let Some(transfer) = self.pending.remove(&key) else {
            return Ok(None);
        };
        let mut message = Vec::with_capacity(transfer.size);
        for slice in transfer.fragments.into_values() {
            message.extend_from_slice(&slice);
        }
        Ok(Some(message))
    }

    /// Drop transfers whose window has passed. Returns how many were dropped.
    pub fn expire_at(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(peer, transfer_id), transfer| {
            let keep = transfer.expires_at > now;
            if !keep {
                tracing::debug!(
                    peer,
                    transfer_id,
                    received = transfer.fragments.len(),
                    expected = transfer.count,
                    "dropping expired fragmented transfer"
                );
            }
            keep
        });
        before - self.pending.len()
    }

    /// Drop every transfer from `sender`.
    pub fn forget_peer(&mut self, sender: PeerId) {
        self.pending.retain(|(peer, _), _| *peer != sender);
    }
}
