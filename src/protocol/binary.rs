//! Binary-dialect decoder/encoder (spec.md §4.2, §6.1 — the authoritative
//! wire table).
//!
//! Every frame is magic `0xC8`, a 1-byte command code, then command-specific
//! fields; multi-byte integers are big-endian. Field sizes aren't known
//! ahead of time (`ksiz`/`vsiz`/etc. are themselves on the wire), so decoding
//! reads directly off the connection rather than through a pre-buffered
//! `BufferReader` — mirrors how `tokio::io::AsyncReadExt` already speaks
//! big-endian for every fixed-width integer the table needs.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::BufferWriter;
use crate::command::{code, Command};
use crate::errors::{ServerError, ServerResult};

pub const MAGIC: u8 = 0xC8;

/// Upper bound on a wire-supplied record count (mget's `rnum`, misc's
/// `rnum`), matching the original server's `MAXARGNUM` guard against an
/// attacker-controlled count driving a huge upfront allocation.
const MAXARGNUM: u32 = 1024 * 1024;

async fn read_sized<R: AsyncRead + Unpin>(stream: &mut R, max_len: usize) -> ServerResult<Vec<u8>> {
    let len = stream.read_u32().await? as usize;
    if len > max_len {
        return Err(ServerError::invalid_input(format!("length {len} exceeds maximum {max_len}")));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Decodes the command-specific fields following the already-consumed magic
/// and command-code bytes, per the §6.1 table.
pub async fn decode_request<R: AsyncRead + Unpin>(stream: &mut R, cmd_code: u8) -> ServerResult<Command> {
    use crate::command::{MAX_KEY_LEN, MAX_VALUE_LEN};
    const MAX_NAME_LEN: usize = 1 << 16;
    const MAX_PATH_LEN: usize = 4096;

    match cmd_code {
        code::PUT => Ok(Command::Put {
            key: read_sized(stream, MAX_KEY_LEN).await?,
            value: read_sized(stream, MAX_VALUE_LEN).await?,
        }),
        code::PUTKEEP => Ok(Command::PutKeep {
            key: read_sized(stream, MAX_KEY_LEN).await?,
            value: read_sized(stream, MAX_VALUE_LEN).await?,
        }),
        code::PUTCAT => Ok(Command::PutCat {
            key: read_sized(stream, MAX_KEY_LEN).await?,
            value: read_sized(stream, MAX_VALUE_LEN).await?,
        }),
        code::PUTSHL => {
            let ksiz = stream.read_u32().await? as usize;
            let vsiz = stream.read_u32().await? as usize;
            let width = stream.read_u32().await?;
            let key = read_exact_len(stream, ksiz, MAX_KEY_LEN).await?;
            let value = read_exact_len(stream, vsiz, MAX_VALUE_LEN).await?;
            Ok(Command::PutShl { key, value, width })
        }
        code::PUTNR => Ok(Command::PutNr {
            key: read_sized(stream, MAX_KEY_LEN).await?,
            value: read_sized(stream, MAX_VALUE_LEN).await?,
        }),
        code::OUT => Ok(Command::Out { key: read_sized(stream, MAX_KEY_LEN).await? }),
        code::GET => Ok(Command::Get { key: read_sized(stream, MAX_KEY_LEN).await? }),
        code::MGET => {
            let rnum = stream.read_u32().await?;
            if rnum > MAXARGNUM {
                return Err(ServerError::invalid_input(format!("mget rnum {rnum} exceeds maximum {MAXARGNUM}")));
            }
            let mut keys = Vec::with_capacity(rnum as usize);
            for _ in 0..rnum {
                keys.push(read_sized(stream, MAX_KEY_LEN).await?);
            }
            Ok(Command::Mget { keys })
        }
        code::VSIZ => Ok(Command::Vsiz { key: read_sized(stream, MAX_KEY_LEN).await? }),
        code::ITERINIT => Ok(Command::IterInit),
        code::ITERNEXT => Ok(Command::IterNext),
        code::FWMKEYS => {
            let psiz = stream.read_u32().await? as usize;
            let max_raw = stream.read_u32().await?;
            let max = max_raw as i32 as i64;
            let prefix = read_exact_len(stream, psiz, MAX_KEY_LEN).await?;
            Ok(Command::Fwmkeys { prefix, max })
        }
        code::ADDINT => {
            let ksiz = stream.read_u32().await? as usize;
            let delta = stream.read_i32().await?;
            let key = read_exact_len(stream, ksiz, MAX_KEY_LEN).await?;
            Ok(Command::AddInt { key, delta, clamp: false })
        }
        code::ADDDOUBLE => {
            let ksiz = stream.read_u32().await? as usize;
            let int_part = stream.read_u64().await?;
            let frac_part = stream.read_u64().await?;
            let delta = unpack_double(int_part, frac_part);
            let key = read_exact_len(stream, ksiz, MAX_KEY_LEN).await?;
            Ok(Command::AddDouble { key, delta })
        }
        code::EXT => {
            let nsiz = stream.read_u32().await? as usize;
            let opts = stream.read_i32().await?;
            let ksiz = stream.read_u32().await? as usize;
            let vsiz = stream.read_u32().await? as usize;
            let name_bytes = read_exact_len(stream, nsiz, MAX_NAME_LEN).await?;
            let key = read_exact_len(stream, ksiz, MAX_KEY_LEN).await?;
            let value = read_exact_len(stream, vsiz, MAX_VALUE_LEN).await?;
            Ok(Command::Ext {
                name: String::from_utf8_lossy(&name_bytes).into_owned(),
                opts,
                key,
                value,
            })
        }
        code::SYNC => Ok(Command::Sync),
        code::VANISH => Ok(Command::Vanish),
        code::COPY => {
            let path_bytes = read_sized(stream, MAX_PATH_LEN).await?;
            Ok(Command::Copy { path: String::from_utf8_lossy(&path_bytes).into_owned() })
        }
        code::RESTORE => {
            let psiz = stream.read_u32().await? as usize;
            let ts = stream.read_u64().await?;
            let path_bytes = read_exact_len(stream, psiz, MAX_PATH_LEN).await?;
            let raw_path = String::from_utf8_lossy(&path_bytes).into_owned();
            // A leading '+' disables the consistency check (spec.md §4.6);
            // it is not a separate wire field.
            let (check, path) = match raw_path.strip_prefix('+') {
                Some(rest) => (false, rest.to_string()),
                None => (true, raw_path),
            };
            Ok(Command::Restore { path, ts, check })
        }
        code::SETMST => {
            let hsiz = stream.read_u32().await? as usize;
            let port = stream.read_u32().await?;
            let host_bytes = read_exact_len(stream, hsiz, MAX_NAME_LEN).await?;
            Ok(Command::Setmst { host: String::from_utf8_lossy(&host_bytes).into_owned(), port })
        }
        code::RNUM => Ok(Command::Rnum),
        code::SIZE => Ok(Command::Size),
        code::STAT => Ok(Command::Stat),
        code::MISC => {
            let nsiz = stream.read_u32().await? as usize;
            let opts = stream.read_i32().await?;
            let rnum = stream.read_u32().await?;
            if rnum > MAXARGNUM {
                return Err(ServerError::invalid_input(format!("misc rnum {rnum} exceeds maximum {MAXARGNUM}")));
            }
            let name_bytes = read_exact_len(stream, nsiz, MAX_NAME_LEN).await?;
            let mut args = Vec::with_capacity(rnum as usize);
            for _ in 0..rnum {
                args.push(read_sized(stream, crate::command::MAX_VALUE_LEN).await?);
            }
            Ok(Command::Misc { name: String::from_utf8_lossy(&name_bytes).into_owned(), opts, args })
        }
        code::REPL => {
            let ts = stream.read_u64().await?;
            let sid = stream.read_u32().await?;
            Ok(Command::Repl { ts, sid })
        }
        other => Err(ServerError::invalid_input(format!("unknown binary command code 0x{other:02x}"))),
    }
}

async fn read_exact_len<R: AsyncRead + Unpin>(stream: &mut R, len: usize, max_len: usize) -> ServerResult<Vec<u8>> {
    if len > max_len {
        return Err(ServerError::invalid_input(format!("length {len} exceeds maximum {max_len}")));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Packs an `f64` delta as `(integer-part, fractional-part * 10^12)`, per
/// spec.md §6.1. Negative deltas carry the sign on the integer part only;
/// the fractional part is always the unsigned scaled remainder.
pub fn pack_double(value: f64) -> (u64, u64) {
    let int_part = value.trunc();
    let frac = (value.fract().abs() * 1_000_000_000_000.0).round() as u64;
    let int_bits = if int_part < 0.0 {
        (int_part as i64 as u64) | (1 << 63)
    } else {
        int_part as i64 as u64
    };
    (int_bits, frac)
}

pub fn unpack_double(int_bits: u64, frac_part: u64) -> f64 {
    let negative = int_bits & (1 << 63) != 0;
    let magnitude = (int_bits & !(1 << 63)) as i64;
    let int_part = if negative { -(magnitude) } else { magnitude };
    let frac = frac_part as f64 / 1_000_000_000_000.0;
    int_part as f64 + if int_part < 0 { -frac } else { frac }
}

/// `u8 status` only — put, putkeep, putcat, putshl, out, ext lock-rejected,
/// sync, vanish, copy, restore, setmst all reply this shape.
pub fn encode_status(status: u8) -> Vec<u8> {
    vec![status]
}

/// `u8 status, u32 vsiz, v` — get.
pub fn encode_status_value(status: u8, value: &[u8]) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_sized_bytes(value);
    w.into_vec()
}

/// `u8 status, u32 vsiz` — vsiz.
pub fn encode_status_u32(status: u8, n: u32) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_u32(n);
    w.into_vec()
}

/// `u8 status, u64 n` — rnum, size.
pub fn encode_status_u64(status: u8, n: u64) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_u64(n);
    w.into_vec()
}

/// `u8 status, i32 sum` — addint.
pub fn encode_status_i32(status: u8, sum: i32) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_i32(sum);
    w.into_vec()
}

/// `u8 status, packed-double sum` — adddouble.
pub fn encode_status_double(status: u8, sum: f64) -> Vec<u8> {
    let (int_part, frac_part) = pack_double(sum);
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_u64(int_part);
    w.write_u64(frac_part);
    w.into_vec()
}

/// `u8 status, u32 len, text` — stat.
pub fn encode_status_text(status: u8, text: &str) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_sized_bytes(text.as_bytes());
    w.into_vec()
}

/// `u8 status, u32 n, (len, bytes)×n` — iternext's caller uses
/// [`encode_status_value`] instead (single key, no count prefix); this shape
/// is fwmkeys and misc's result list.
pub fn encode_status_list(status: u8, items: &[Vec<u8>]) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_u32(items.len() as u32);
    for item in items {
        w.write_sized_bytes(item);
    }
    w.into_vec()
}

/// `u8 status, u32 n, (ksiz, vsiz, k, v)×n` — mget.
pub fn encode_mget(status: u8, pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut w = BufferWriter::new();
    w.write_u8(status);
    w.write_u32(pairs.len() as u32);
    for (k, v) in pairs {
        w.write_sized_bytes(k);
        w.write_sized_bytes(v);
    }
    w.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_round_trips_positive_and_negative() {
        for v in [0.0, 1.5, -1.5, 42.125, -999.000000000001] {
            let (int_part, frac_part) = pack_double(v);
            let back = unpack_double(int_part, frac_part);
            assert!((back - v).abs() < 1e-9, "{v} round-tripped to {back}");
        }
    }

    #[tokio::test]
    async fn decodes_put_request() {
        let mut w = BufferWriter::new();
        w.write_u32(3);
        w.write_u32(5);
        w.write_bytes(b"foo");
        w.write_bytes(b"hello");
        let bytes = w.into_vec();
        let cmd = decode_request(&mut bytes.as_slice(), code::PUT).await.unwrap();
        assert_eq!(cmd, Command::Put { key: b"foo".to_vec(), value: b"hello".to_vec() });
    }

    #[tokio::test]
    async fn decodes_restore_with_leading_plus() {
        let mut w = BufferWriter::new();
        let path = b"+/var/lib/ulog";
        w.write_u32(path.len() as u32);
        w.write_u64(12345);
        w.write_bytes(path);
        let bytes = w.into_vec();
        let cmd = decode_request(&mut bytes.as_slice(), code::RESTORE).await.unwrap();
        assert_eq!(
            cmd,
            Command::Restore { path: "/var/lib/ulog".to_string(), ts: 12345, check: false }
        );
    }
}
