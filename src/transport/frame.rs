//! Message envelopes.
//!
//! Every config message starts with a flag byte. The fragment and compressed
//! envelopes wrap a complete inner message, which again starts with its own
//! flag byte:
//!
//! ```text
//! fragment:   [0x02] [transfer id LE64] [index LE32] [count LE32] [slice len LE32] [slice]
//! compressed: [0x04] [body len LE32] [zstd body]
//! plain:      [flags] [entry count LE32] [entries]
//! ```

use crate::codec::{WireReader, WireWriter};
use crate::core::WireError;
use crate::core::constants::{FLAG_COMPRESSED, FLAG_FRAGMENT, FLAG_PARTIAL, FRAGMENT_HEADER_SIZE};

/// One fragment of a larger message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFrame<'a> {
    /// Sender-unique transfer id shared by all fragments of one message.
    pub transfer_id: u64,
    /// Position of this slice.
    pub index: u32,
    /// Total number of fragments.
    pub count: u32,
    /// Slice of the inner message.
    pub slice: &'a [u8],
}

impl FragmentFrame<'_> {
    /// Serialize the fragment envelope.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(FRAGMENT_HEADER_SIZE + self.slice.len());
        writer.write_u8(FLAG_FRAGMENT);
        writer.write_u64(self.transfer_id);
        writer.write_u32(self.index);
        writer.write_u32(self.count);
        writer.write_bytes(self.slice);
        writer.into_bytes()
    }
}

/// A parsed message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<'a> {
    /// One fragment of a larger message.
    Fragment(FragmentFrame<'a>),
    /// A compressed inner message.
    Compressed(&'a [u8]),
    /// A plain message, flag byte included.
    Plain {
        /// Whether the partial flag is set.
        partial: bool,
        /// The complete message.
        message: &'a [u8],
    },
}

impl<'a> Envelope<'a> {
    /// Classify a message by its flag byte.
    ///
    /// The fragment flag takes precedence over the compressed flag.
    pub fn parse(data: &'a [u8]) -> Result<Self, WireError> {
        let mut reader = WireReader::new(data);
        let flags = reader.read_u8()?;

        if flags & FLAG_FRAGMENT != 0 {
            let transfer_id = reader.read_u64()?;
            let index = reader.read_u32()?;
            let count = reader.read_u32()?;
            let len = reader.read_len(1)?;
            let slice = reader.read_rest();
            if slice.len() != len {
                return Err(WireError::TrailingBytes(slice.len() - len));
            }
            return Ok(Envelope::Fragment(FragmentFrame {
                transfer_id,
                index,
                count,
                slice,
            }));
        }

        if flags & FLAG_COMPRESSED != 0 {
            let len = reader.read_len(1)?;
            let body = reader.read_rest();
            if body.len() != len {
                return Err(WireError::TrailingBytes(body.len() - len));
            }
            return Ok(Envelope::Compressed(body));
        }

        Ok(Envelope::Plain {
            partial: flags & FLAG_PARTIAL != 0,
            message: data,
        })
    }
}

/// Wrap a compressed body in its envelope.
pub fn encode_compressed(body: &[u8]) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(5 + body.len());
    writer.write_u8(FLAG_COMPRESSED);
    writer.write_bytes(body);
    writer.into_bytes()
}
