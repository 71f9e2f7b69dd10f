//! Periodic task runner (spec.md §4, component 11): fires the scripting
//! extension's named periodic functions on their configured interval. One
//! `tokio::spawn`ed task per function, each an independent `interval` loop.
//!
//! Replication reconnect attempts are the runner's other named
//! responsibility, but the follower task already drives its own 1s-backoff
//! retry loop ([`crate::replication::follower::run`]) — nothing extra is
//! spawned here for that.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::ServerContext;

/// Spawns one task per registered periodic script function. Returns
/// immediately; the spawned tasks run for the process lifetime.
pub fn spawn_all(ctx: Arc<ServerContext>) {
    for (name, interval) in ctx.script.periodic_functions() {
        let ctx = ctx.clone();
        tokio::spawn(run_one(ctx, name, interval));
    }
}

async fn run_one(ctx: Arc<ServerContext>, name: String, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so periodic functions don't
    // run the instant the process starts.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        debug!(function = %name, "running periodic script function");
        if let Err(e) = ctx.script.call(&name, &[], &[]).await {
            warn!(function = %name, error = %e, "periodic script function failed");
        }
    }
}
