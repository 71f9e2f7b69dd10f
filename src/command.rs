//! The closed command enumeration shared by every dialect decoder, the
//! router, the handlers, and the update log.
//!
//! spec.md §9 asks for "a table mapping (dialect, code) -> handler" backed
//! by "a closed enumeration... [not] dynamic registration" — `Command` is
//! that enumeration. Decoding a binary frame, a memcached text line, or an
//! HTTP request all produce the same `Command` value, which is what lets
//! the mutation wrapper serialise one `Command` into an update-log payload
//! (`ulog::frame`) regardless of which dialect originated it.

use crate::errors::{ServerError, ServerResult};

/// `ext`'s lock policy bits (spec.md §4.6, §6.1).
pub const EXT_OPT_RECORD_LOCK: i32 = 1 << 0;
pub const EXT_OPT_GLOBAL_LOCK: i32 = 1 << 1;

/// `misc`'s option bits (spec.md §4.6).
pub const MISC_OPT_MONO_ULOG: i32 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: Vec<u8>, value: Vec<u8> },
    PutKeep { key: Vec<u8>, value: Vec<u8> },
    PutCat { key: Vec<u8>, value: Vec<u8> },
    PutShl { key: Vec<u8>, value: Vec<u8>, width: u32 },
    PutNr { key: Vec<u8>, value: Vec<u8> },
    Out { key: Vec<u8> },
    Get { key: Vec<u8> },
    Mget { keys: Vec<Vec<u8>> },
    Vsiz { key: Vec<u8> },
    IterInit,
    IterNext,
    Fwmkeys { prefix: Vec<u8>, max: i64 },
    /// `clamp`: floor the stored sum at 0 instead of letting it go negative.
    /// Binary `addint` never sets this; the memcached text dialect's
    /// `decr` does (spec.md §4.3, §4.6 — text incr/decr clamps, binary
    /// addint does not).
    AddInt { key: Vec<u8>, delta: i32, clamp: bool },
    AddDouble { key: Vec<u8>, delta: f64 },
    Ext { name: String, opts: i32, key: Vec<u8>, value: Vec<u8> },
    Sync,
    Vanish,
    Copy { path: String },
    Restore { path: String, ts: u64, check: bool },
    Setmst { host: String, port: u32 },
    Rnum,
    Size,
    Stat,
    Misc { name: String, opts: i32, args: Vec<Vec<u8>> },
    Repl { ts: u64, sid: u32 },
}

impl Command {
    /// Whether this command mutates the backend and therefore goes through
    /// the mutation wrapper (spec.md §4.6: "write" vs. "read" handlers).
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Put { .. }
                | Command::PutKeep { .. }
                | Command::PutCat { .. }
                | Command::PutShl { .. }
                | Command::PutNr { .. }
                | Command::Out { .. }
                | Command::AddInt { .. }
                | Command::AddDouble { .. }
                | Command::Vanish
        )
    }

    /// Coarse access-mask bucket this command belongs to, used by
    /// `mask::AccessMask` alongside the per-command bit.
    pub fn bucket(&self) -> crate::mask::Bucket {
        use crate::mask::Bucket;
        match self {
            Command::Sync | Command::Copy { .. } | Command::Restore { .. } | Command::Setmst { .. } => {
                Bucket::Manage
            }
            c if c.is_write() => Bucket::Write,
            _ => Bucket::Read,
        }
    }
}

/// Binary-dialect command codes (spec.md §6.1), reused verbatim as the
/// update-log payload's leading byte (spec.md §4.7: "an opaque record...
/// the backend can replay" — here, replay means re-decoding this same
/// byte shape).
pub mod code {
    pub const PUT: u8 = 0x10;
    pub const PUTKEEP: u8 = 0x11;
    pub const PUTCAT: u8 = 0x12;
    pub const PUTSHL: u8 = 0x13;
    pub const PUTNR: u8 = 0x18;
    pub const OUT: u8 = 0x20;
    pub const GET: u8 = 0x30;
    pub const MGET: u8 = 0x31;
    pub const VSIZ: u8 = 0x38;
    pub const ITERINIT: u8 = 0x50;
    pub const ITERNEXT: u8 = 0x51;
    pub const FWMKEYS: u8 = 0x58;
    pub const ADDINT: u8 = 0x60;
    pub const ADDDOUBLE: u8 = 0x61;
    pub const EXT: u8 = 0x68;
    pub const SYNC: u8 = 0x70;
    pub const VANISH: u8 = 0x71;
    pub const COPY: u8 = 0x72;
    pub const RESTORE: u8 = 0x73;
    pub const SETMST: u8 = 0x78;
    pub const RNUM: u8 = 0x80;
    pub const SIZE: u8 = 0x81;
    pub const STAT: u8 = 0x88;
    pub const MISC: u8 = 0x90;
    pub const REPL: u8 = 0xA0;
}

pub const MAX_KEY_LEN: usize = 1 << 24;
pub const MAX_VALUE_LEN: usize = 1 << 24;
pub const MAX_PAYLOAD_LEN: usize = 1 << 24;

/// Serialises a mutating `Command` into the update-log / replication-stream
/// payload shape: one command-code byte followed by the same field layout
/// as the binary request frame (minus the leading `0xC8` magic, which the
/// frame header already carries).
pub fn encode_payload(cmd: &Command) -> Vec<u8> {
    use crate::buffer::BufferWriter;
    let mut w = BufferWriter::new();
    match cmd {
        Command::Put { key, value } => {
            w.write_u8(code::PUT);
            w.write_sized_bytes(key);
            w.write_sized_bytes(value);
        }
        Command::PutKeep { key, value } => {
            w.write_u8(code::PUTKEEP);
            w.write_sized_bytes(key);
            w.write_sized_bytes(value);
        }
        Command::PutCat { key, value } => {
            w.write_u8(code::PUTCAT);
            w.write_sized_bytes(key);
            w.write_sized_bytes(value);
        }
        Command::PutShl { key, value, width } => {
            w.write_u8(code::PUTSHL);
            w.write_u32(*width);
            w.write_sized_bytes(key);
            w.write_sized_bytes(value);
        }
        Command::PutNr { key, value } => {
            w.write_u8(code::PUTNR);
            w.write_sized_bytes(key);
            w.write_sized_bytes(value);
        }
        Command::Out { key } => {
            w.write_u8(code::OUT);
            w.write_sized_bytes(key);
        }
        Command::AddInt { key, delta, clamp } => {
            w.write_u8(code::ADDINT);
            w.write_i32(*delta);
            w.write_u8(if *clamp { 1 } else { 0 });
            w.write_sized_bytes(key);
        }
        Command::AddDouble { key, delta } => {
            w.write_u8(code::ADDDOUBLE);
            let (int_part, frac_part) = crate::protocol::binary::pack_double(*delta);
            w.write_u64(int_part);
            w.write_u64(frac_part);
            w.write_sized_bytes(key);
        }
        Command::Vanish => {
            w.write_u8(code::VANISH);
        }
        Command::Restore { path, ts, check } => {
            w.write_u8(code::RESTORE);
            w.write_u64(*ts);
            w.write_u8(if *check { 1 } else { 0 });
            w.write_sized_bytes(path.as_bytes());
        }
        other => unreachable!("{other:?} is not a loggable mutation"),
    }
    w.into_vec()
}

/// Inverse of [`encode_payload`], used by the replication follower to
/// rebuild a `Command` from a received log frame.
pub fn decode_payload(bytes: &[u8]) -> ServerResult<Command> {
    use crate::buffer::BufferReader;
    let mut r = BufferReader::new(bytes);
    let op = r.read_u8()?;
    match op {
        code::PUT => Ok(Command::Put {
            key: r.read_sized_bytes(MAX_KEY_LEN)?,
            value: r.read_sized_bytes(MAX_VALUE_LEN)?,
        }),
        code::PUTKEEP => Ok(Command::PutKeep {
            key: r.read_sized_bytes(MAX_KEY_LEN)?,
            value: r.read_sized_bytes(MAX_VALUE_LEN)?,
        }),
        code::PUTCAT => Ok(Command::PutCat {
            key: r.read_sized_bytes(MAX_KEY_LEN)?,
            value: r.read_sized_bytes(MAX_VALUE_LEN)?,
        }),
        code::PUTSHL => {
            let width = r.read_u32()?;
            Ok(Command::PutShl {
                key: r.read_sized_bytes(MAX_KEY_LEN)?,
                value: r.read_sized_bytes(MAX_VALUE_LEN)?,
                width,
            })
        }
        code::PUTNR => Ok(Command::PutNr {
            key: r.read_sized_bytes(MAX_KEY_LEN)?,
            value: r.read_sized_bytes(MAX_VALUE_LEN)?,
        }),
        code::OUT => Ok(Command::Out { key: r.read_sized_bytes(MAX_KEY_LEN)? }),
        code::ADDINT => {
            let delta = r.read_i32()?;
            let clamp = r.read_u8()? != 0;
            Ok(Command::AddInt { key: r.read_sized_bytes(MAX_KEY_LEN)?, delta, clamp })
        }
        code::ADDDOUBLE => {
            let int_part = r.read_u64()?;
            let frac_part = r.read_u64()?;
            let delta = crate::protocol::binary::unpack_double(int_part, frac_part);
            Ok(Command::AddDouble { key: r.read_sized_bytes(MAX_KEY_LEN)?, delta })
        }
        code::VANISH => Ok(Command::Vanish),
        code::RESTORE => {
            let ts = r.read_u64()?;
            let check = r.read_u8()? != 0;
            let path_bytes = r.read_sized_bytes(4096)?;
            Ok(Command::Restore {
                path: String::from_utf8_lossy(&path_bytes).into_owned(),
                ts,
                check,
            })
        }
        other => Err(ServerError::invalid_input(format!(
            "unknown update-log payload op 0x{other:02x}"
        ))),
    }
}
