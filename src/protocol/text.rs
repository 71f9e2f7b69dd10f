//! Memcached-compatible text dialect (spec.md §4.3, §6.2).
//!
//! One command per line, tokens separated by runs of whitespace. `set`,
//! `add`, `replace` carry a length-prefixed payload block on the line(s)
//! after the header; every other recognised command is header-only.
//! Flags and exptime are accepted for protocol compatibility and ignored —
//! this dialect never expires anything.

use crate::command::Command;
use crate::errors::{ServerError, ServerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
}

/// A fully decoded text-dialect request: the equivalent `Command` plus the
/// dialect-specific bits the router needs back (store mode, for the
/// NOT_STORED-vs-STORED distinction; noreply, to suppress the response
/// line without skipping execution).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub command: Command,
    pub store_mode: Option<StoreMode>,
    pub noreply: bool,
}

/// Tells the caller how many bytes of payload (if any) to read next, before
/// [`finish_storage_command`] can build the final `Command`.
pub enum Decoded {
    Complete(TextRequest),
    /// `set`/`add`/`replace`: read `len` bytes plus the trailing CRLF, then
    /// call [`finish_storage_command`].
    NeedsPayload { key: Vec<u8>, len: usize, store_mode: StoreMode, noreply: bool },
    Quit,
}

/// Parses one header line (without its trailing CRLF).
pub fn decode_line(line: &str) -> ServerResult<Decoded> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or_else(|| ServerError::invalid_input("empty command line"))?;

    match verb {
        "set" | "add" | "replace" => {
            let key = tokens.next().ok_or_else(|| ServerError::invalid_input("missing key"))?;
            let _flags: u32 = parse_token(tokens.next(), "flags")?;
            let _exptime: i64 = parse_token(tokens.next(), "exptime")?;
            let len: usize = parse_token(tokens.next(), "bytes")?;
            let noreply = tokens.next() == Some("noreply");
            let store_mode = match verb {
                "set" => StoreMode::Set,
                "add" => StoreMode::Add,
                _ => StoreMode::Replace,
            };
            Ok(Decoded::NeedsPayload { key: key.as_bytes().to_vec(), len, store_mode, noreply })
        }
        "get" | "gets" => {
            let key = tokens.next().ok_or_else(|| ServerError::invalid_input("missing key"))?;
            Ok(Decoded::Complete(TextRequest {
                command: Command::Get { key: key.as_bytes().to_vec() },
                store_mode: None,
                noreply: false,
            }))
        }
        "delete" => {
            let key = tokens.next().ok_or_else(|| ServerError::invalid_input("missing key"))?;
            let noreply = tokens.next() == Some("noreply");
            Ok(Decoded::Complete(TextRequest {
                command: Command::Out { key: key.as_bytes().to_vec() },
                store_mode: None,
                noreply,
            }))
        }
        "incr" | "decr" => {
            let key = tokens.next().ok_or_else(|| ServerError::invalid_input("missing key"))?;
            let amount: i64 = parse_token(tokens.next(), "amount")?;
            let noreply = tokens.next() == Some("noreply");
            let delta = if verb == "incr" { amount } else { -amount };
            let delta = delta.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            Ok(Decoded::Complete(TextRequest {
                command: Command::AddInt { key: key.as_bytes().to_vec(), delta, clamp: true },
                store_mode: None,
                noreply,
            }))
        }
        "stats" => Ok(Decoded::Complete(TextRequest { command: Command::Stat, store_mode: None, noreply: false })),
        "flush_all" => {
            Ok(Decoded::Complete(TextRequest { command: Command::Vanish, store_mode: None, noreply: false }))
        }
        "version" => {
            Ok(Decoded::Complete(TextRequest { command: Command::Rnum, store_mode: None, noreply: false }))
        }
        "quit" => Ok(Decoded::Quit),
        other => Err(ServerError::invalid_input(format!("unrecognised text command {other:?}"))),
    }
}

/// Builds the final `Command` for a `set`/`add`/`replace` once its payload
/// block has been read off the connection.
pub fn finish_storage_command(key: Vec<u8>, value: Vec<u8>, store_mode: StoreMode, noreply: bool) -> TextRequest {
    let command = match store_mode {
        StoreMode::Set => Command::Put { key, value },
        StoreMode::Add => Command::PutKeep { key, value },
        StoreMode::Replace => Command::Put { key, value },
    };
    TextRequest { command, store_mode: Some(store_mode), noreply }
}

fn parse_token<T: std::str::FromStr>(token: Option<&str>, field: &str) -> ServerResult<T> {
    token
        .ok_or_else(|| ServerError::invalid_input(format!("missing {field}")))?
        .parse()
        .map_err(|_| ServerError::invalid_input(format!("malformed {field}")))
}

/// Canonical response lines (spec.md §4.3).
pub mod response {
    pub const STORED: &str = "STORED\r\n";
    pub const NOT_STORED: &str = "NOT_STORED\r\n";
    pub const DELETED: &str = "DELETED\r\n";
    pub const NOT_FOUND: &str = "NOT_FOUND\r\n";
    pub const END: &str = "END\r\n";
    pub const ERROR: &str = "ERROR\r\n";

    pub fn version(v: &str) -> String {
        format!("VERSION {v}\r\n")
    }

    pub fn value_block(key: &[u8], value: &[u8]) -> String {
        format!(
            "VALUE {} 0 {}\r\n{}\r\n{}",
            String::from_utf8_lossy(key),
            value.len(),
            String::from_utf8_lossy(value),
            END
        )
    }

    pub fn numeric(n: i64) -> String {
        format!("{n}\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_get() {
        let decoded = decode_line("get mykey").unwrap();
        match decoded {
            Decoded::Complete(req) => assert_eq!(req.command, Command::Get { key: b"mykey".to_vec() }),
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn decodes_set_header_and_final_command() {
        let decoded = decode_line("set foo 0 0 5").unwrap();
        match decoded {
            Decoded::NeedsPayload { key, len, store_mode, noreply } => {
                assert_eq!(key, b"foo");
                assert_eq!(len, 5);
                assert_eq!(store_mode, StoreMode::Set);
                assert!(!noreply);
                let req = finish_storage_command(key, b"hello".to_vec(), store_mode, noreply);
                assert_eq!(req.command, Command::Put { key: b"foo".to_vec(), value: b"hello".to_vec() });
            }
            _ => panic!("expected NeedsPayload"),
        }
    }

    #[test]
    fn noreply_suppresses_response_but_parses_command() {
        let decoded = decode_line("delete foo noreply").unwrap();
        match decoded {
            Decoded::Complete(req) => assert!(req.noreply),
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn decr_clamped_into_i32_becomes_negative_delta() {
        let decoded = decode_line("decr counter 7").unwrap();
        match decoded {
            Decoded::Complete(req) => {
                assert_eq!(
                    req.command,
                    Command::AddInt { key: b"counter".to_vec(), delta: -7, clamp: true }
                )
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn incr_and_decr_both_request_floor_clamping() {
        for (line, expected_delta) in [("incr counter 3", 3), ("decr counter 3", -3)] {
            let decoded = decode_line(line).unwrap();
            match decoded {
                Decoded::Complete(req) => match req.command {
                    Command::AddInt { delta, clamp, .. } => {
                        assert_eq!(delta, expected_delta);
                        assert!(clamp);
                    }
                    other => panic!("expected AddInt, got {other:?}"),
                },
                _ => panic!("expected Complete"),
            }
        }
    }
}
