//! On-disk frame format for a single update-log event (spec.md §3, §4.7).
//!
//! `{ u8 magic (0xC8), u64 timestamp, u32 origin_sid, u32 payload_len, payload }`
//! — the same magic byte that opens a binary-dialect client frame, since
//! both are "a Tokyo-Tyrant-style length-framed record", just with
//! different trailing fields.

use crate::buffer::{BufferReader, BufferWriter};
use crate::errors::{ServerError, ServerResult};

pub const ULOG_MAGIC: u8 = 0xC8;
/// Replication-stream keepalive byte (spec.md §4.8), sent with no
/// trailing fields so the follower can tell a live-but-idle master from a
/// dead connection.
pub const ULOG_KEEPALIVE: u8 = 0xC9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlogFrame {
    pub timestamp: u64,
    pub origin_sid: u32,
    pub payload: Vec<u8>,
}

impl UlogFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = BufferWriter::with_capacity(17 + self.payload.len());
        w.write_u8(ULOG_MAGIC);
        w.write_u64(self.timestamp);
        w.write_u32(self.origin_sid);
        w.write_sized_bytes(&self.payload);
        w.into_vec()
    }

    /// Decodes one frame from the head of `buf`, returning the frame and
    /// the number of bytes consumed. `Ok(None)` means `buf` does not yet
    /// hold a complete frame (the reader should read more and retry).
    pub fn decode_prefix(buf: &[u8]) -> ServerResult<Option<(Self, usize)>> {
        if buf.len() < 17 {
            return Ok(None);
        }
        let mut r = BufferReader::new(buf);
        let magic = r.read_u8()?;
        if magic != ULOG_MAGIC {
            return Err(ServerError::invalid_input(format!(
                "bad update-log frame magic 0x{magic:02x}"
            )));
        }
        let timestamp = r.read_u64()?;
        let origin_sid = r.read_u32()?;
        let payload_len = r.read_u32()? as usize;
        if payload_len > crate::command::MAX_PAYLOAD_LEN {
            return Err(ServerError::invalid_input("update-log payload too large"));
        }
        if !r.has_bytes(payload_len) {
            return Ok(None);
        }
        let payload = r.read_bytes(payload_len)?;
        Ok(Some((Self { timestamp, origin_sid, payload }, r.position())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let frame = UlogFrame { timestamp: 123, origin_sid: 7, payload: b"hello".to_vec() };
        let bytes = frame.encode();
        let (decoded, consumed) = UlogFrame::decode_prefix(&bytes).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn incomplete_frame_is_none() {
        let frame = UlogFrame { timestamp: 1, origin_sid: 1, payload: b"x".to_vec() };
        let bytes = frame.encode();
        assert!(UlogFrame::decode_prefix(&bytes[..bytes.len() - 1]).unwrap().is_none());
    }
}
