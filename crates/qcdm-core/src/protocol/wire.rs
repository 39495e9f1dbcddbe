//! Bounds-checked little-endian field access
//!
//! Every multi-byte field in a DM payload is little-endian. Parsers read
//! through [`FieldReader`] so an offset past the end of a short response is an
//! error, never a panic.

use byteorder::{ByteOrder, LittleEndian};

use super::error::CommandError;

/// Reads fixed-offset fields out of a response payload
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    command: u8,
}

impl<'a> FieldReader<'a> {
    /// Wrap `buf`; `command` is reported in length errors
    pub fn new(buf: &'a [u8], command: u8) -> Self {
        Self { buf, command }
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn short(&self, needed: usize) -> CommandError {
        CommandError::TooShort {
            command: self.command,
            needed,
            got: self.buf.len(),
        }
    }

    /// Slice `len` bytes starting at `offset`
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], CommandError> {
        let end = offset.checked_add(len).ok_or_else(|| self.short(usize::MAX))?;
        self.buf.get(offset..end).ok_or_else(|| self.short(end))
    }

    /// Byte at `offset`
    pub fn u8(&self, offset: usize) -> Result<u8, CommandError> {
        self.buf.get(offset).copied().ok_or_else(|| self.short(offset + 1))
    }

    /// Little-endian u16 at `offset`
    pub fn u16(&self, offset: usize) -> Result<u16, CommandError> {
        self.bytes(offset, 2).map(LittleEndian::read_u16)
    }

    /// Little-endian u32 at `offset`
    pub fn u32(&self, offset: usize) -> Result<u32, CommandError> {
        self.bytes(offset, 4).map(LittleEndian::read_u32)
    }

    /// Little-endian u64 at `offset`
    pub fn u64(&self, offset: usize) -> Result<u64, CommandError> {
        self.bytes(offset, 8).map(LittleEndian::read_u64)
    }

    /// Fixed-width text field, cut at the first NUL
    pub fn text(&self, offset: usize, len: usize) -> Result<String, CommandError> {
        let raw = self.bytes(offset, len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Builds a request payload field by field
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    /// Start a payload with the given command code
    pub fn command(code: u8) -> Self {
        Self { buf: vec![code] }
    }

    /// Append a byte
    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    /// Append a little-endian u16
    pub fn u16(mut self, v: u16) -> Self {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
        self
    }

    /// Append a little-endian u32
    pub fn u32(mut self, v: u32) -> Self {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
        self
    }

    /// Append raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Append `count` zero bytes
    pub fn zeros(mut self, count: usize) -> Self {
        self.buf.resize(self.buf.len() + count, 0);
        self
    }

    /// Append `data` padded (or cut) to exactly `width` bytes
    pub fn fixed(mut self, data: &[u8], width: usize) -> Self {
        let n = data.len().min(width);
        self.buf.extend_from_slice(&data[..n]);
        self.buf.resize(self.buf.len() + (width - n), 0);
        self
    }

    /// Finish and return the payload
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
