//! Primitive wire encoding.
//!
//! All integers are little-endian. Strings and byte arrays carry a 4-byte
//! LE32 length prefix.

use crate::core::WireError;

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a bool as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write a LE32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a LE64.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a signed LE64.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write an IEEE-754 double.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a count or length prefix.
    pub fn write_len(&mut self, len: usize) {
        self.write_u32(len as u32);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a length-prefixed byte array.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_len(value.len());
        self.buf.extend_from_slice(value);
    }

    /// Append raw bytes without a prefix.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Consume the writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Error unless the whole input was consumed.
    pub fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::UnexpectedEof {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a one-byte bool (any non-zero value is true).
    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a LE32.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a LE64.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a signed LE64.
    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read an IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Read a length prefix, rejecting lengths that cannot fit in the rest of
    /// the buffer (each element occupies at least `min_element_size` bytes).
    pub fn read_len(&mut self, min_element_size: usize) -> Result<usize, WireError> {
        let len = self.read_u32()?;
        let needed = (len as usize).saturating_mul(min_element_size);
        if needed > self.remaining() {
            return Err(WireError::InvalidLength(len));
        }
        Ok(len as usize)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_len(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8)
    }

    /// Read a length-prefixed byte array.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_len(1)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Read everything left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_layout() {
        let mut writer = WireWriter::new();
        writer.write_u8(0x04);
        writer.write_u32(2);
        writer.write_str("ab");

        assert_eq!(writer.into_bytes(), vec![0x04, 2, 0, 0, 0, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_read_back() {
        let mut writer = WireWriter::new();
        writer.write_bool(true);
        writer.write_i64(-42);
        writer.write_f64(1.5);
        writer.write_u64(u64::MAX);
        writer.write_bytes(&[9, 8, 7]);
        let data = writer.into_bytes();

        let mut reader = WireReader::new(&data);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i64().unwrap(), -42);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_bytes().unwrap(), vec![9, 8, 7]);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_truncated_read() {
        let mut reader = WireReader::new(&[1, 2]);
        assert!(matches!(
            reader.read_u32(),
            Err(WireError::UnexpectedEof { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_implausible_length() {
        // Claims a 1000-byte string but carries 2 bytes.
        let mut reader = WireReader::new(&[0xE8, 0x03, 0, 0, b'h', b'i']);
        assert_eq!(reader.read_string(), Err(WireError::InvalidLength(1000)));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut reader = WireReader::new(&[2, 0, 0, 0, 0xFF, 0xFE]);
        assert_eq!(reader.read_string(), Err(WireError::InvalidUtf8));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut reader = WireReader::new(&[1, 2, 3]);
        reader.read_u8().unwrap();
        assert_eq!(reader.finish(), Err(WireError::TrailingBytes(2)));
    }
}
