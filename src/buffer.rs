//! Cursor-based readers/writers over byte buffers.
//!
//! Every wire format in this crate (binary dialect frames, update log
//! frames, replication state) is a flat sequence of fixed-width
//! big-endian integers and length-prefixed byte strings; `BufferReader`
//! and `BufferWriter` give every decoder/encoder the same small, explicit
//! vocabulary instead of repeating slice arithmetic everywhere.

use crate::errors::{ServerError, ServerResult};
use crate::utils::{buf_recv_i32, buf_recv_i64, buf_recv_u32, buf_recv_u64};

/// A buffer reader that manages position and provides meaningful parsing methods.
#[derive(Debug)]
pub struct BufferReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    pub fn has_bytes(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    pub fn read_u8(&mut self) -> ServerResult<u8> {
        if !self.has_bytes(1) {
            return Err(ServerError::invalid_input("not enough bytes for u8"));
        }
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> ServerResult<u32> {
        if !self.has_bytes(4) {
            return Err(ServerError::invalid_input("not enough bytes for u32"));
        }
        let value = buf_recv_u32(&self.buffer[self.position..]);
        self.position += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> ServerResult<i32> {
        if !self.has_bytes(4) {
            return Err(ServerError::invalid_input("not enough bytes for i32"));
        }
        let value = buf_recv_i32(&self.buffer[self.position..]);
        self.position += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> ServerResult<u64> {
        if !self.has_bytes(8) {
            return Err(ServerError::invalid_input("not enough bytes for u64"));
        }
        let value = buf_recv_u64(&self.buffer[self.position..]);
        self.position += 8;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> ServerResult<i64> {
        if !self.has_bytes(8) {
            return Err(ServerError::invalid_input("not enough bytes for i64"));
        }
        let value = buf_recv_i64(&self.buffer[self.position..]);
        self.position += 8;
        Ok(value)
    }

    /// Reads `count` raw bytes, advancing the cursor.
    pub fn read_bytes(&mut self, count: usize) -> ServerResult<Vec<u8>> {
        if !self.has_bytes(count) {
            return Err(ServerError::invalid_input("not enough bytes"));
        }
        let bytes = self.buffer[self.position..self.position + count].to_vec();
        self.position += count;
        Ok(bytes)
    }

    /// Reads all remaining bytes.
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let bytes = self.buffer[self.position..].to_vec();
        self.position = self.buffer.len();
        bytes
    }

    /// Reads a `u32`-length-prefixed byte string (the §6.1 `ksiz`/`vsiz`
    /// framing used by every binary command).
    pub fn read_sized_bytes(&mut self, max_len: usize) -> ServerResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > max_len {
            return Err(ServerError::invalid_input(format!(
                "length {len} exceeds maximum {max_len}"
            )));
        }
        self.read_bytes(len)
    }

    pub fn peek_u8(&self) -> ServerResult<u8> {
        if !self.has_bytes(1) {
            return Err(ServerError::invalid_input("no bytes to peek"));
        }
        Ok(self.buffer[self.position])
    }
}

/// A growable buffer writer; unlike the decoder's fixed-slice reader, the
/// encoder always knows its final size only once all fields are queued up,
/// so it owns a `Vec<u8>` rather than borrowing a caller-sized slice.
#[derive(Debug, Default)]
pub struct BufferWriter {
    buffer: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity) }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a `u32` length prefix followed by the bytes themselves.
    pub fn write_sized_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_bytes(bytes);
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sized_bytes() {
        let mut w = BufferWriter::new();
        w.write_u8(0x10);
        w.write_sized_bytes(b"abc");
        w.write_sized_bytes(b"hello");
        let bytes = w.into_vec();

        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0x10);
        assert_eq!(r.read_sized_bytes(1 << 24).unwrap(), b"abc");
        assert_eq!(r.read_sized_bytes(1 << 24).unwrap(), b"hello");
    }

    #[test]
    fn rejects_oversize_length() {
        let mut w = BufferWriter::new();
        w.write_u32(100);
        w.write_bytes(&[0u8; 10]);
        let bytes = w.into_vec();
        let mut r = BufferReader::new(&bytes);
        assert!(r.read_sized_bytes(16).is_err());
    }
}
