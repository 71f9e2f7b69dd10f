//! Signal handling (spec.md §4.1, §5): SIGHUP rotates the update log,
//! SIGTERM/SIGINT trigger graceful shutdown. SIGPIPE needs no explicit
//! handler — Rust's runtime already ignores it, so a write to a closed
//! socket surfaces as an `Err` instead of killing the process.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::context::ServerContext;

/// Resolves the first time SIGTERM or SIGINT arrives. Pass this as the
/// `shutdown` future to [`crate::server::run`].
pub async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

/// Spawns a task that reopens the update log's current segment file on
/// every SIGHUP, without disturbing active connections (spec.md §4.1).
pub fn spawn_sighup_handler(ctx: Arc<ServerContext>) {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGHUP handler");
                return;
            }
        };
        loop {
            if sighup.recv().await.is_none() {
                return;
            }
            info!("received SIGHUP, reopening update log");
            if let Err(e) = ctx.ulog.reopen().await {
                error!(error = %e, "failed to reopen update log after SIGHUP");
            }
        }
    });
}
