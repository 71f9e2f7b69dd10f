//! Per-connection request loop: dialect sniffing, decode, route, encode,
//! repeat (spec.md §4.1).
//!
//! `fill_buf`/`consume` on a `tokio::io::BufReader` peeks the first byte
//! without disturbing the stream — if it's the binary magic, decode as
//! binary; otherwise read one line and sniff for an HTTP request line,
//! falling back to the memcached text dialect.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::command::Command;
use crate::context::ServerContext;
use crate::errors::{ServerError, ServerResult};
use crate::handlers::{self, Outcome};
use crate::mask::Dialect;
use crate::protocol::{binary, http, text};
use crate::router;

/// Drives one connection until the peer disconnects or a transport error
/// occurs. Never returns `Err` for ordinary protocol errors — those are
/// reported to the peer and the loop continues.
pub async fn handle<S>(stream: S, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    loop {
        let first = match reader.fill_buf().await {
            Ok(buf) if buf.is_empty() => return,
            Ok(buf) => buf[0],
            Err(e) => {
                debug!(error = %e, "connection read error");
                return;
            }
        };

        let result = if first == binary::MAGIC {
            reader.consume(1);
            run_binary(&mut reader, &ctx).await
        } else {
            run_line_based(&mut reader, &ctx).await
        };

        match result {
            Ok(true) => continue,
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, "connection loop error");
                return;
            }
        }
    }
}

/// Runs one binary-dialect request. Returns `Ok(true)` to keep the
/// connection open (binary keeps alive by default, per spec.md §4.1).
async fn run_binary<RW>(reader: &mut RW, ctx: &ServerContext) -> ServerResult<bool>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    let code = reader.read_u8().await?;

    if code == crate::command::code::REPL {
        let ts = reader.read_u64().await?;
        let sid = reader.read_u32().await?;
        let cmd = Command::Repl { ts, sid };
        if let Err(e) = router::check_mask(ctx, &cmd, Dialect::Binary) {
            reader.write_all(&binary::encode_status(e.binary_status())).await?;
            reader.flush().await?;
            return Ok(false);
        }
        handlers::repl::stream(ctx, reader, ts, sid).await?;
        return Ok(false);
    }

    let cmd = match binary::decode_request(reader, code).await {
        Ok(cmd) => cmd,
        Err(e) => {
            reader.write_all(&binary::encode_status(e.binary_status())).await?;
            reader.flush().await?;
            return Ok(true);
        }
    };
    let is_putnr = matches!(cmd, Command::PutNr { .. });

    let outcome = router::route(ctx, cmd, Dialect::Binary).await;

    if is_putnr {
        // Fire-and-forget: no response frame regardless of outcome
        // (spec.md §6.1). A failure is still worth a log line.
        if let Err(e) = outcome {
            debug!(error = %e, "putnr failed silently");
        }
        return Ok(true);
    }

    let bytes = match outcome {
        Ok(outcome) => encode_binary_success(outcome),
        Err(e) => binary::encode_status(e.binary_status()),
    };
    reader.write_all(&bytes).await?;
    reader.flush().await?;
    Ok(true)
}

fn encode_binary_success(outcome: Outcome) -> Vec<u8> {
    match outcome {
        Outcome::Unit | Outcome::NoReply => binary::encode_status(0),
        Outcome::Value(v) => binary::encode_status_value(0, &v),
        Outcome::U32(n) => binary::encode_status_u32(0, n),
        Outcome::I32(n) => binary::encode_status_i32(0, n),
        Outcome::F64(n) => binary::encode_status_double(0, n),
        Outcome::U64(n) => binary::encode_status_u64(0, n),
        Outcome::Text(t) => binary::encode_status_text(0, &t),
        Outcome::KeyList(items) => binary::encode_status_list(0, &items),
        Outcome::Mget(pairs) => binary::encode_mget(0, &pairs),
    }
}

/// Runs one text or HTTP request starting from a line already partially
/// buffered (the dialect sniff peeked its first byte but didn't consume
/// it). Returns `Ok(keep_alive)`.
async fn run_line_based<RW>(reader: &mut RW, ctx: &ServerContext) -> ServerResult<bool>
where
    RW: AsyncBufReadExt + AsyncWrite + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(false);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();

    if http::looks_like_http(&trimmed) {
        run_http(reader, ctx, &trimmed).await
    } else {
        run_text(reader, ctx, &trimmed).await
    }
}

async fn run_text<RW>(reader: &mut RW, ctx: &ServerContext, line: &str) -> ServerResult<bool>
where
    RW: AsyncBufReadExt + AsyncWrite + Unpin,
{
    let decoded = match text::decode_line(line) {
        Ok(d) => d,
        Err(_) => {
            reader.write_all(text::response::ERROR.as_bytes()).await?;
            reader.flush().await?;
            return Ok(true);
        }
    };

    let request = match decoded {
        text::Decoded::Quit => return Ok(false),
        text::Decoded::Complete(req) => req,
        text::Decoded::NeedsPayload { key, len, store_mode, noreply } => {
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).await?;
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;
            text::finish_storage_command(key, payload, store_mode, noreply)
        }
    };

    let noreply = request.noreply;
    let store_mode = request.store_mode;
    let outcome = router::route(ctx, request.command.clone(), Dialect::Text).await;

    if noreply {
        if let Err(e) = outcome {
            debug!(error = %e, "noreply text command failed silently");
        }
        return Ok(true);
    }

    let response = encode_text_response(&request.command, store_mode, outcome);
    reader.write_all(response.as_bytes()).await?;
    reader.flush().await?;
    Ok(true)
}

fn encode_text_response(
    cmd: &Command,
    store_mode: Option<text::StoreMode>,
    outcome: ServerResult<Outcome>,
) -> String {
    use text::response;
    match (cmd, store_mode, outcome) {
        (Command::PutKeep { .. }, Some(_), Err(ServerError::Conflict)) => response::NOT_STORED.to_string(),
        (_, Some(_), Ok(_)) => response::STORED.to_string(),
        (_, Some(_), Err(_)) => response::NOT_STORED.to_string(),
        (Command::Out { .. }, _, Ok(_)) => response::DELETED.to_string(),
        (Command::Out { .. }, _, Err(ServerError::NotFound)) => response::NOT_FOUND.to_string(),
        (Command::Get { key }, _, Ok(Outcome::Value(v))) => response::value_block(key, &v),
        (Command::Get { .. }, _, Ok(_)) => response::END.to_string(),
        (Command::Get { .. }, _, Err(_)) => response::END.to_string(),
        (Command::AddInt { .. }, _, Ok(Outcome::I32(n))) => response::numeric(n as i64),
        (Command::AddInt { .. }, _, Err(_)) => response::ERROR.to_string(),
        (Command::Vanish, _, Ok(_)) => "OK\r\n".to_string(),
        (Command::Rnum, _, Ok(_)) => response::version(env!("CARGO_PKG_VERSION")),
        (Command::Stat, _, Ok(Outcome::Text(t))) => {
            let body = t.trim_end_matches('\n').replace('\n', "\r\nSTAT ");
            format!("STAT {body}\r\n{}", response::END)
        }
        (_, _, Err(ServerError::Forbidden)) => "CLIENT_ERROR forbidden\r\n".to_string(),
        (_, _, Err(_)) => response::ERROR.to_string(),
        (_, _, Ok(_)) => response::END.to_string(),
    }
}

async fn run_http<RW>(reader: &mut RW, ctx: &ServerContext, request_line: &str) -> ServerResult<bool>
where
    RW: AsyncBufReadExt + AsyncWrite + Unpin,
{
    let line = match http::parse_request_line(request_line) {
        Ok(l) => l,
        Err(_) => {
            reader.write_all(http::status::BAD_REQUEST.as_bytes()).await?;
            reader.write_all(b"Content-Length: 0\r\n\r\n").await?;
            reader.flush().await?;
            return Ok(false);
        }
    };

    let mut headers_raw = Vec::new();
    let mut content_length = None;
    let mut pdmode = None;
    let mut xname = None;
    let mut xopts = None;
    let mut connection_header = None;
    let http_1_1 = request_line.contains("HTTP/1.1");

    loop {
        let mut header_line = String::new();
        let n = reader.read_line(&mut header_line).await?;
        if n == 0 || header_line == "\r\n" || header_line == "\n" || header_line.is_empty() {
            break;
        }
        headers_raw.push(header_line.trim_end_matches(['\r', '\n']).to_string());
    }
    for header in &headers_raw {
        if let Some((name, value)) = header.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            match name.as_str() {
                "content-length" => content_length = value.parse().ok(),
                "x-tt-pdmode" => pdmode = Some(value),
                "x-tt-xname" => xname = Some(value),
                "x-tt-xopts" => xopts = Some(value),
                "connection" => connection_header = Some(value),
                _ => {}
            }
        }
    }

    let headers = http::Headers {
        content_length,
        pdmode,
        xname,
        xopts,
        connection: connection_header,
        http_version_1_1: http_1_1,
    };

    let body_len = headers.content_length.unwrap_or(0);
    let mut body = vec![0u8; body_len];
    if body_len > 0 {
        reader.read_exact(&mut body).await?;
    }

    let request = match http::build_request(line, &headers, body) {
        Ok(r) => r,
        Err(_) => {
            reader.write_all(http::status::BAD_REQUEST.as_bytes()).await?;
            reader.write_all(b"Content-Length: 0\r\n\r\n").await?;
            reader.flush().await?;
            return Ok(headers.http_version_1_1);
        }
    };

    let keep_alive = request.keep_alive;
    let outcome = router::route(ctx, request.command.clone(), Dialect::Http).await;
    let (head, body) = encode_http_response(request.method, request.pdmode, outcome);
    reader.write_all(head.as_bytes()).await?;
    reader.write_all(&body).await?;
    reader.flush().await?;
    Ok(keep_alive)
}

/// Builds the status line, headers, and a blank line as one string, paired
/// with the raw response body — kept separate so a non-UTF8 value never
/// passes through a lossy string conversion on its way to the wire.
fn encode_http_response(
    method: http::Method,
    pdmode: Option<http::PdMode>,
    outcome: ServerResult<Outcome>,
) -> (String, Vec<u8>) {
    use http::{status, Method, PdMode};

    fn empty(status_line: &str) -> (String, Vec<u8>) {
        (format!("{status_line}Content-Length: 0\r\n\r\n"), Vec::new())
    }
    fn with_body(status_line: &str, body: Vec<u8>) -> (String, Vec<u8>) {
        (format!("{status_line}Content-Length: {}\r\n\r\n", body.len()), body)
    }

    match (method, pdmode, outcome) {
        (Method::Get, _, Ok(Outcome::Value(v))) => with_body(status::OK, v),
        (Method::Get, _, Err(ServerError::NotFound)) => empty(status::NOT_FOUND),
        (Method::Head, _, Ok(_)) => empty(status::OK),
        (Method::Head, _, Err(ServerError::NotFound)) => empty(status::NOT_FOUND),
        (Method::Put, Some(PdMode::InsertOnly), Ok(_)) => empty(status::CREATED),
        (Method::Put, Some(PdMode::InsertOnly), Err(ServerError::Conflict)) => empty(status::CONFLICT),
        // Overwrite and concatenate both report 201 same as insert-only
        // success; only the insert-only conflict case gets a distinct status.
        (Method::Put, _, Ok(_)) => empty(status::CREATED),
        (Method::Post, _, Ok(Outcome::Value(v))) => with_body(status::OK, v),
        (Method::Delete, _, Ok(_)) => empty(status::NO_CONTENT),
        (Method::Delete, _, Err(ServerError::NotFound)) => empty(status::NOT_FOUND),
        (_, _, Err(ServerError::Forbidden)) => empty(status::FORBIDDEN),
        (_, _, Err(_)) => empty(status::INTERNAL_ERROR),
        (_, _, Ok(_)) => empty(status::OK),
    }
}
