//! Access mask: the 64-bit forbidden-command bitfield (spec.md §3, §4.5).
//!
//! A command is forbidden iff `(mask & command_bit) != 0`. Coarse buckets
//! (`all-read`, `all-write`, `all-manage`, per-dialect, `ALL`) are additional
//! bits checked alongside the specific command bit, exactly as spec.md §4.5
//! describes — the router tests both before ever touching the backend.

use crate::command::Command;

pub const MSK_PUT: u64 = 1 << 0;
pub const MSK_PUTKEEP: u64 = 1 << 1;
pub const MSK_PUTCAT: u64 = 1 << 2;
pub const MSK_PUTSHL: u64 = 1 << 3;
pub const MSK_PUTNR: u64 = 1 << 4;
pub const MSK_OUT: u64 = 1 << 5;
pub const MSK_GET: u64 = 1 << 6;
pub const MSK_MGET: u64 = 1 << 7;
pub const MSK_VSIZ: u64 = 1 << 8;
pub const MSK_ITERINIT: u64 = 1 << 9;
pub const MSK_ITERNEXT: u64 = 1 << 10;
pub const MSK_FWMKEYS: u64 = 1 << 11;
pub const MSK_ADDINT: u64 = 1 << 12;
pub const MSK_ADDDOUBLE: u64 = 1 << 13;
pub const MSK_EXT: u64 = 1 << 14;
pub const MSK_SYNC: u64 = 1 << 15;
pub const MSK_VANISH: u64 = 1 << 16;
pub const MSK_COPY: u64 = 1 << 17;
pub const MSK_RESTORE: u64 = 1 << 18;
pub const MSK_SETMST: u64 = 1 << 19;
pub const MSK_RNUM: u64 = 1 << 20;
pub const MSK_SIZE: u64 = 1 << 21;
pub const MSK_STAT: u64 = 1 << 22;
pub const MSK_MISC: u64 = 1 << 23;
pub const MSK_REPL: u64 = 1 << 24;
pub const MSK_ALL_BINARY: u64 = 1 << 26;
pub const MSK_ALL_TEXT: u64 = 1 << 27;
pub const MSK_ALL_HTTP: u64 = 1 << 28;
pub const MSK_ALL_READ: u64 = 1 << 29;
pub const MSK_ALL_WRITE: u64 = 1 << 30;
pub const MSK_ALL_MANAGE: u64 = 1 << 31;
pub const MSK_ALL: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Read,
    Write,
    Manage,
}

impl Bucket {
    fn bit(self) -> u64 {
        match self {
            Bucket::Read => MSK_ALL_READ,
            Bucket::Write => MSK_ALL_WRITE,
            Bucket::Manage => MSK_ALL_MANAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Binary,
    Text,
    Http,
}

impl Dialect {
    fn bit(self) -> u64 {
        match self {
            Dialect::Binary => MSK_ALL_BINARY,
            Dialect::Text => MSK_ALL_TEXT,
            Dialect::Http => MSK_ALL_HTTP,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccessMask(pub u64);

impl AccessMask {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn command_bit(cmd: &Command) -> u64 {
        match cmd {
            Command::Put { .. } => MSK_PUT,
            Command::PutKeep { .. } => MSK_PUTKEEP,
            Command::PutCat { .. } => MSK_PUTCAT,
            Command::PutShl { .. } => MSK_PUTSHL,
            Command::PutNr { .. } => MSK_PUTNR,
            Command::Out { .. } => MSK_OUT,
            Command::Get { .. } => MSK_GET,
            Command::Mget { .. } => MSK_MGET,
            Command::Vsiz { .. } => MSK_VSIZ,
            Command::IterInit => MSK_ITERINIT,
            Command::IterNext => MSK_ITERNEXT,
            Command::Fwmkeys { .. } => MSK_FWMKEYS,
            Command::AddInt { .. } => MSK_ADDINT,
            Command::AddDouble { .. } => MSK_ADDDOUBLE,
            Command::Ext { .. } => MSK_EXT,
            Command::Sync => MSK_SYNC,
            Command::Vanish => MSK_VANISH,
            Command::Copy { .. } => MSK_COPY,
            Command::Restore { .. } => MSK_RESTORE,
            Command::Setmst { .. } => MSK_SETMST,
            Command::Rnum => MSK_RNUM,
            Command::Size => MSK_SIZE,
            Command::Stat => MSK_STAT,
            Command::Misc { .. } => MSK_MISC,
            Command::Repl { .. } => MSK_REPL,
        }
    }

    /// True iff `cmd`, arriving over `dialect`, is forbidden: its specific
    /// bit, its coarse bucket bit, its dialect bit, or `ALL` is set.
    pub fn forbids(&self, cmd: &Command, dialect: Dialect) -> bool {
        let bits = Self::command_bit(cmd) | cmd.bucket().bit() | dialect.bit() | MSK_ALL;
        (self.0 & bits) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_forbids_every_member() {
        let mask = AccessMask(MSK_ALL_WRITE);
        assert!(mask.forbids(&Command::Put { key: vec![], value: vec![] }, Dialect::Binary));
        assert!(!mask.forbids(&Command::Get { key: vec![] }, Dialect::Binary));
    }

    #[test]
    fn all_bit_forbids_everything() {
        let mask = AccessMask(MSK_ALL);
        assert!(mask.forbids(&Command::Rnum, Dialect::Http));
    }

    #[test]
    fn specific_bit_is_independent_of_bucket() {
        let mask = AccessMask(MSK_PUT);
        assert!(mask.forbids(&Command::Put { key: vec![], value: vec![] }, Dialect::Binary));
        assert!(!mask.forbids(&Command::PutKeep { key: vec![], value: vec![] }, Dialect::Binary));
    }
}
