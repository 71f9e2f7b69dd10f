//! Replication follower loop (spec.md §4.8).
//!
//! One task runs for the whole process lifetime, watching a
//! `watch::Receiver<Option<MasterTarget>>` so `setmst` can retarget it
//! without restarting the task — "the follower observes and reconnects"
//! (spec.md §4.6). Within one target, I/O errors restart the connection
//! after a 1s backoff, matching the teacher's `replication_loop` retry
//! shape.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MasterTarget;
use crate::context::ServerContext;
use crate::errors::{ServerError, ServerResult};
use crate::protocol::binary::MAGIC;
use crate::replication::state::ReplState;

const KEEPALIVE: u8 = 0xC9;
const EVENT: u8 = 0xC8;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Runs until the process shuts down. Never returns `Err` — all failures
/// are logged and retried, matching "retry with 1s backoff indefinitely"
/// from spec.md §7.
pub async fn run(ctx: std::sync::Arc<ServerContext>, mut target_rx: watch::Receiver<Option<MasterTarget>>) {
    loop {
        let target = target_rx.borrow().clone();
        let Some(master) = target else {
            // No master configured; wait for setmst to set one.
            if target_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        let state = ReplState::new(ctx.config.repl_state_path(&master));
        info!(host = %master.host, port = master.port, "replication follower connecting");

        tokio::select! {
            result = follow_one_master(&ctx, &master, &state) => {
                if let Err(e) = result {
                    warn!(error = %e, host = %master.host, port = master.port, "replication connection lost");
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            changed = target_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                info!("replication target changed, reconnecting");
            }
        }
    }
}

async fn follow_one_master(
    ctx: &ServerContext,
    master: &MasterTarget,
    state: &ReplState,
) -> ServerResult<()> {
    let last_applied = state.load().await?;
    let mut stream = TcpStream::connect((master.host.as_str(), master.port)).await?;

    let mut request = vec![MAGIC, crate::command::code::REPL];
    request.extend_from_slice(&(last_applied + 1).to_be_bytes());
    request.extend_from_slice(&ctx.config.sid.to_be_bytes());
    stream.write_all(&request).await?;

    loop {
        let tag = stream.read_u8().await?;
        match tag {
            KEEPALIVE => {
                debug!("replication keepalive");
                continue;
            }
            EVENT => {
                let ts = stream.read_u64().await?;
                let origin_sid = stream.read_u32().await?;
                let payload_len = stream.read_u32().await? as usize;
                if payload_len > crate::command::MAX_PAYLOAD_LEN {
                    return Err(ServerError::invalid_input("replication payload too large"));
                }
                let mut payload = vec![0u8; payload_len];
                stream.read_exact(&mut payload).await?;

                if origin_sid == ctx.config.sid {
                    debug!(ts, "skipping self-originated replication event");
                    continue;
                }

                let cmd = crate::command::decode_payload(&payload)?;
                ctx.mutation.replay(cmd, origin_sid).await?;
                state.store(ts).await?;
            }
            other => {
                return Err(ServerError::ReplDisconnect(format!("unexpected replication frame tag 0x{other:02x}")));
            }
        }
    }
}
