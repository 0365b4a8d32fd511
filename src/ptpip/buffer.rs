//! Little-endian byte buffer used by the packet layer.
//!
//! All PTP/IP wire integers are little-endian. Reads are offset-addressed and
//! return `None` when the requested range runs past the end of the buffer, so
//! callers can treat a short read as "packet not complete yet" rather than an
//! error.

use crate::error::{PtpError, Result};

fn read_le(bytes: &[u8], offset: usize, width: usize) -> Option<u64> {
    let end = offset.checked_add(width)?;
    if end > bytes.len() {
        return None;
    }
    let mut value: u64 = 0;
    for (i, b) in bytes[offset..end].iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    Some(value)
}

/// Read a null-terminated UTF-16LE string. Returns the string and the number
/// of bytes consumed (terminator included).
fn read_utf16_string(bytes: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut units = Vec::new();
    let mut cursor = offset;
    loop {
        let unit = read_le(bytes, cursor, 2)? as u16;
        cursor += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let string = String::from_utf16_lossy(&units);
    Some((string, cursor - offset))
}

/// Growable little-endian byte buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Build a buffer from a hex string. Whitespace is ignored so fixtures
    /// can be written as "0f 00 00 00".
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let compact: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&compact)
            .map_err(|e| PtpError::invalid_payload(format!("bad hex fixture: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        read_le(&self.bytes, offset, 1).map(|v| v as u8)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        read_le(&self.bytes, offset, 2).map(|v| v as u16)
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        read_le(&self.bytes, offset, 4).map(|v| v as u32)
    }

    pub fn read_u64(&self, offset: usize) -> Option<u64> {
        read_le(&self.bytes, offset, 8)
    }

    pub fn read_i8(&self, offset: usize) -> Option<i8> {
        self.read_u8(offset).map(|v| v as i8)
    }

    pub fn read_i16(&self, offset: usize) -> Option<i16> {
        self.read_u16(offset).map(|v| v as i16)
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        self.read_u32(offset).map(|v| v as i32)
    }

    /// Null-terminated UTF-16LE string; returns (string, bytes consumed).
    pub fn read_utf16_string(&self, offset: usize) -> Option<(String, usize)> {
        read_utf16_string(&self.bytes, offset)
    }

    /// PTP-style string: u8 character count (terminator included) followed by
    /// that many UTF-16LE units. Returns (string, bytes consumed).
    pub fn read_ptp_string(&self, offset: usize) -> Option<(String, usize)> {
        let count = self.read_u8(offset)? as usize;
        if count == 0 {
            return Some((String::new(), 1));
        }
        let mut units = Vec::with_capacity(count.saturating_sub(1));
        for i in 0..count {
            let unit = self.read_u16(offset + 1 + i * 2)?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Some((String::from_utf16_lossy(&units), 1 + count * 2))
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.bytes.get(offset..end)
    }

    pub fn append_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn append_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn append_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn append_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn append_slice(&mut self, slice: &[u8]) {
        self.bytes.extend_from_slice(slice);
    }

    /// Append a null-terminated UTF-16LE string.
    pub fn append_utf16_string(&mut self, value: &str) {
        for unit in value.encode_utf16() {
            self.append_u16(unit);
        }
        self.append_u16(0);
    }

    /// Overwrite 4 bytes at an existing offset. No-op past the end.
    pub fn set_u32(&mut self, offset: usize, value: u32) {
        if let Some(slot) = self.bytes.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Non-copying view of the tail starting at `offset`, with zero-based
    /// addressing of its own.
    pub fn view(&self, offset: usize) -> ByteView<'_> {
        ByteView {
            bytes: self.bytes.get(offset..).unwrap_or(&[]),
        }
    }

    /// Drop the first `len` bytes (a fully parsed packet).
    pub fn drain_front(&mut self, len: usize) {
        let len = len.min(self.bytes.len());
        self.bytes.drain(..len);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Borrowed window into a [`ByteBuffer`] with its own zero-based offsets.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        read_le(self.bytes, offset, 1).map(|v| v as u8)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        read_le(self.bytes, offset, 2).map(|v| v as u16)
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        read_le(self.bytes, offset, 4).map(|v| v as u32)
    }

    pub fn read_u64(&self, offset: usize) -> Option<u64> {
        read_le(self.bytes, offset, 8)
    }

    pub fn read_utf16_string(&self, offset: usize) -> Option<(String, usize)> {
        read_utf16_string(self.bytes, offset)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.bytes.get(offset..end)
    }

    pub fn sub_view(&self, offset: usize) -> ByteView<'a> {
        ByteView {
            bytes: self.bytes.get(offset..).unwrap_or(&[]),
        }
    }
}
