//! Master-side `repl` streaming handler (spec.md §4.8).
//!
//! Opens a [`crate::ulog::LogReader`] at the requested timestamp and
//! streams frames to the follower, interleaving a 1-byte keepalive during
//! idle stretches so the follower can detect a dead connection. Never
//! times out on its own — it runs until the connection closes or the
//! server shuts down.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::context::ServerContext;
use crate::errors::ServerResult;
use crate::ulog::{LogReader, ULOG_KEEPALIVE};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub async fn stream<W: AsyncWrite + Unpin>(
    ctx: &ServerContext,
    writer: &mut W,
    ts: u64,
    sid: u32,
) -> ServerResult<()> {
    let mut reader = LogReader::open(&ctx.config.ulog_dir, ts).await?;
    loop {
        match tokio::time::timeout(KEEPALIVE_INTERVAL, reader.next_frame()).await {
            Ok(frame) => {
                let frame = frame?;
                if frame.origin_sid == sid {
                    // Loop-prevention mirror of the follower side: don't
                    // echo an event back to the peer that originated it.
                    continue;
                }
                writer.write_all(&frame.encode()).await?;
                writer.flush().await?;
            }
            Err(_timeout) => {
                writer.write_all(&[ULOG_KEEPALIVE]).await?;
                writer.flush().await?;
            }
        }
    }
}
