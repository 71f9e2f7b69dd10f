//! Minimal HTTP/1.1 dialect (spec.md §4.4, §6.3).
//!
//! One request line plus headers; the URI path (after stripping the leading
//! `/` and percent-decoding) is the key. `PUT` honours `X-TT-PDMODE` for the
//! overwrite/insert-only/concatenate choice; `POST` invokes the scripting
//! extension via `X-TT-XNAME`/`X-TT-XOPTS`.

use percent_encoding::percent_decode_str;

use crate::command::{Command, EXT_OPT_GLOBAL_LOCK, EXT_OPT_RECORD_LOCK};
use crate::errors::{ServerError, ServerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdMode {
    Overwrite,
    InsertOnly,
    Concatenate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub command: Command,
    pub method: Method,
    pub keep_alive: bool,
    pub pdmode: Option<PdMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

pub struct RequestLine {
    pub method: Method,
    pub key: Vec<u8>,
}

/// Parses the request line (e.g. `GET /mykey HTTP/1.1`) into a method and
/// percent-decoded key. Header parsing and body reading happen separately
/// since the body length depends on `Content-Length`.
pub fn parse_request_line(line: &str) -> ServerResult<RequestLine> {
    let mut parts = line.split_whitespace();
    let method_tok = parts.next().ok_or_else(|| ServerError::invalid_input("empty HTTP request line"))?;
    let uri = parts.next().ok_or_else(|| ServerError::invalid_input("missing HTTP URI"))?;

    let method = match method_tok {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        "PUT" => Method::Put,
        "POST" => Method::Post,
        "DELETE" => Method::Delete,
        other => return Err(ServerError::invalid_input(format!("unsupported HTTP method {other:?}"))),
    };

    let path = uri.strip_prefix('/').unwrap_or(uri);
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| ServerError::invalid_input("URI is not valid percent-encoded UTF-8"))?;
    Ok(RequestLine { method, key: decoded.into_owned().into_bytes() })
}

/// Whether the third token of the request line is an HTTP version marker —
/// used by the connection-level dialect sniff (spec.md §4.1).
pub fn looks_like_http(request_line: &str) -> bool {
    request_line
        .split_whitespace()
        .nth(2)
        .map(|tok| tok.starts_with("HTTP/1."))
        .unwrap_or(false)
}

/// Headers relevant to this dialect, already lower-cased by the caller.
#[derive(Debug, Default)]
pub struct Headers<'a> {
    pub content_length: Option<usize>,
    pub pdmode: Option<&'a str>,
    pub xname: Option<&'a str>,
    pub xopts: Option<&'a str>,
    pub connection: Option<&'a str>,
    pub http_version_1_1: bool,
}

fn parse_pdmode(value: Option<&str>) -> Option<PdMode> {
    match value {
        Some("0") => Some(PdMode::Overwrite),
        Some("1") => Some(PdMode::InsertOnly),
        Some("2") => Some(PdMode::Concatenate),
        _ => None,
    }
}

fn parse_xopts(value: Option<&str>) -> i32 {
    let mut opts = 0;
    if let Some(raw) = value {
        for tok in raw.split(',') {
            match tok.trim() {
                "record-lock" => opts |= EXT_OPT_RECORD_LOCK,
                "global-lock" => opts |= EXT_OPT_GLOBAL_LOCK,
                _ => {}
            }
        }
    }
    opts
}

/// Resolves whether the connection should stay open after this response:
/// HTTP/1.0 closes by default, HTTP/1.1 keeps alive unless `Connection:
/// close` is present, and either version can force keep-alive explicitly.
pub fn resolve_keep_alive(headers: &Headers<'_>) -> bool {
    let explicit_close = headers.connection.map(|c| c.eq_ignore_ascii_case("close")).unwrap_or(false);
    let explicit_keep_alive = headers.connection.map(|c| c.eq_ignore_ascii_case("keep-alive")).unwrap_or(false);
    if explicit_close {
        false
    } else if explicit_keep_alive {
        true
    } else {
        headers.http_version_1_1
    }
}

/// Builds the final `Command` once the request line, headers, and (for
/// PUT/POST) body have all been read.
pub fn build_request(line: RequestLine, headers: &Headers<'_>, body: Vec<u8>) -> ServerResult<HttpRequest> {
    let keep_alive = resolve_keep_alive(headers);
    let pdmode = parse_pdmode(headers.pdmode);

    let command = match line.method {
        Method::Get | Method::Head => Command::Get { key: line.key.clone() },
        Method::Delete => Command::Out { key: line.key.clone() },
        Method::Put => match pdmode.unwrap_or(PdMode::Overwrite) {
            PdMode::Overwrite => Command::Put { key: line.key.clone(), value: body },
            PdMode::InsertOnly => Command::PutKeep { key: line.key.clone(), value: body },
            PdMode::Concatenate => Command::PutCat { key: line.key.clone(), value: body },
        },
        Method::Post => {
            let name = headers
                .xname
                .ok_or_else(|| ServerError::invalid_input("POST requires X-TT-XNAME"))?
                .to_string();
            let opts = parse_xopts(headers.xopts);
            Command::Ext { name, opts, key: line.key.clone(), value: body }
        }
    };

    Ok(HttpRequest { command, method: line.method, keep_alive, pdmode })
}

/// Canonical status lines this dialect needs (spec.md §4.4, §4.6).
pub mod status {
    pub const OK: &str = "HTTP/1.1 200 OK\r\n";
    pub const CREATED: &str = "HTTP/1.1 201 Created\r\n";
    pub const NO_CONTENT: &str = "HTTP/1.1 204 No Content\r\n";
    pub const CONFLICT: &str = "HTTP/1.1 409 Conflict\r\n";
    pub const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\n";
    pub const FORBIDDEN: &str = "HTTP/1.1 403 Forbidden\r\n";
    pub const BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request\r\n";
    pub const INTERNAL_ERROR: &str = "HTTP/1.1 500 Internal Server Error\r\n";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request_line() {
        let line = parse_request_line("GET /my%20key HTTP/1.1").unwrap();
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.key, b"my key");
    }

    #[test]
    fn sniffs_http_from_third_token() {
        assert!(looks_like_http("GET /k HTTP/1.1"));
        assert!(!looks_like_http("get k"));
    }

    #[test]
    fn put_pdmode_insert_only_maps_to_putkeep() {
        let line = RequestLine { method: Method::Put, key: b"k".to_vec() };
        let headers = Headers { pdmode: Some("1"), http_version_1_1: true, ..Default::default() };
        let req = build_request(line, &headers, b"v".to_vec()).unwrap();
        assert_eq!(req.command, Command::PutKeep { key: b"k".to_vec(), value: b"v".to_vec() });
    }

    #[test]
    fn http_1_0_closes_by_default() {
        let headers = Headers { http_version_1_1: false, ..Default::default() };
        assert!(!resolve_keep_alive(&headers));
    }

    #[test]
    fn http_1_1_closes_only_on_explicit_connection_close() {
        let mut headers = Headers { http_version_1_1: true, ..Default::default() };
        assert!(resolve_keep_alive(&headers));
        headers.connection = Some("close");
        assert!(!resolve_keep_alive(&headers));
    }

    #[test]
    fn post_requires_xname() {
        let line = RequestLine { method: Method::Post, key: b"k".to_vec() };
        let headers = Headers::default();
        assert!(build_request(line, &headers, vec![]).is_err());
    }
}
