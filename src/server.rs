//! TCP/Unix accept loop and fixed-size worker pool (spec.md §4.1, §9).
//!
//! A `tokio::sync::Semaphore` with `config.workers` permits caps how many
//! connections are served concurrently; the listener blocks on a permit
//! before `accept()`ing the next socket rather than queueing unboundedly.
//! Accept failures back off exponentially up to 64s instead of busy-looping
//! a bad file descriptor.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::config::BindTarget;
use crate::connection;
use crate::context::ServerContext;

/// Runs the accept loop until `shutdown` resolves. Each accepted connection
/// is handed to [`connection::handle`] on its own task.
pub async fn run(ctx: Arc<ServerContext>, shutdown: impl std::future::Future<Output = ()>) {
    let limit = Arc::new(Semaphore::new(ctx.config.workers));

    tokio::select! {
        () = accept_loop(ctx, limit) => {}
        () = shutdown => {
            info!("shutdown signal received, no longer accepting connections");
        }
    }
}

async fn accept_loop(ctx: Arc<ServerContext>, limit: Arc<Semaphore>) {
    match ctx.config.bind.clone() {
        BindTarget::Tcp(addr) => {
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "failed to bind TCP listener");
                    return;
                }
            };
            info!(%addr, "listening (tcp)");
            accept_tcp(listener, ctx, limit).await;
        }
        BindTarget::Unix(path) => {
            let _ = std::fs::remove_file(&path);
            let listener = match UnixListener::bind(&path) {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, path = %path.display(), "failed to bind unix listener");
                    return;
                }
            };
            info!(path = %path.display(), "listening (unix)");
            accept_unix(listener, ctx, limit).await;
        }
    }
}

#[instrument(skip_all)]
async fn accept_tcp(listener: TcpListener, ctx: Arc<ServerContext>, limit: Arc<Semaphore>) {
    let mut backoff = 1u64;
    loop {
        let permit = limit.clone().acquire_owned().await.expect("semaphore never closed");
        match listener.accept().await {
            Ok((socket, peer)) => {
                backoff = 1;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    info!(%peer, "connection accepted");
                    connection::handle(socket, ctx).await;
                    info!(%peer, "connection closed");
                    drop(permit);
                });
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "accept failed");
                if backoff > 64 {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff *= 2;
            }
        }
    }
}

#[instrument(skip_all)]
async fn accept_unix(listener: UnixListener, ctx: Arc<ServerContext>, limit: Arc<Semaphore>) {
    let mut backoff = 1u64;
    loop {
        let permit = limit.clone().acquire_owned().await.expect("semaphore never closed");
        match listener.accept().await {
            Ok((socket, _addr)) => {
                backoff = 1;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    info!("connection accepted");
                    connection::handle(socket, ctx).await;
                    info!("connection closed");
                    drop(permit);
                });
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "accept failed");
                if backoff > 64 {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff *= 2;
            }
        }
    }
}
