//! Inbound unwrapping: reassemble fragments, then decompress.

use std::time::Instant;

use thiserror::Error;

use super::compression::{CompressionError, Compressor};
use super::fragment::{FragmentAssembler, FragmentError};
use super::frame::Envelope;
use crate::core::{PeerId, SyncConfig, WireError};

/// Errors while unwrapping an inbound message. The message is dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The envelope header was malformed.
    #[error("malformed envelope: {0}")]
    Envelope(#[from] WireError),

    /// Decompression failed.
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// A fragment was rejected.
    #[error("fragment error: {0}")]
    Fragment(#[from] FragmentError),

    /// An envelope wrapped another envelope of a kind that cannot nest.
    #[error("unexpected nested envelope")]
    NestedEnvelope,
}

/// A complete plain message, ready for the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Whether the partial flag is set.
    pub partial: bool,
    /// The plain message, flag byte included.
    pub message: Vec<u8>,
}

/// Turns raw inbound messages into plain messages.
#[derive(Debug)]
pub struct InboundAssembler {
    fragments: FragmentAssembler,
    compressor: Compressor,
}

impl InboundAssembler {
    /// Create an assembler.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            fragments: FragmentAssembler::new(config.fragment_expiry, config.max_decompressed_size),
            compressor: Compressor::from_config(config),
        }
    }

    /// Drop expired partial transfers.
    pub fn expire_at(&mut self, now: Instant) -> usize {
        self.fragments.expire_at(now)
    }

    /// Number of incomplete transfers.
    pub fn pending_transfers(&self) -> usize {
        self.fragments.pending_len()
    }

    /// Drop partial transfers from a disconnected peer.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.fragments.forget_peer(peer);
    }

    /// Feed one message from `sender`.
    ///
    /// Returns `None` while a fragmented transfer is still incomplete.
    pub fn receive_at(
        &mut self,
        sender: PeerId,
        data: &[u8],
        now: Instant,
    ) -> Result<Option<InboundMessage>, TransportError> {
        match Envelope::parse(data)? {
            Envelope::Fragment(frame) => match self.fragments.insert_at(sender, &frame, now)? {
                Some(whole) => self.open_envelope(&whole).map(Some),
                None => Ok(None),
            },
            _ => self.open_envelope(data).map(Some),
        }
    }

    fn open_envelope(&self, data: &[u8]) -> Result<InboundMessage, TransportError> {
        match Envelope::parse(data)? {
            Envelope::Fragment(_) => Err(TransportError::NestedEnvelope),
            Envelope::Compressed(body) => {
                let inner = self.compressor.decompress(body)?;
                let partial = match Envelope::parse(&inner)? {
                    Envelope::Plain { partial, .. } => partial,
                    _ => return Err(TransportError::NestedEnvelope),
                };
                Ok(InboundMessage {
                    partial,
                    message: inner,
                })
            }
            Envelope::Plain { partial, message } => Ok(InboundMessage {
                partial,
                message: message.to_vec(),
            }),
        }
    }
}
