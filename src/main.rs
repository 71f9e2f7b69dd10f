//! Entry point: parse CLI args, build the shared [`ServerContext`], wire up
//! replication/periodic background tasks and signal handling, then run the
//! accept loop until a shutdown signal arrives.

mod buffer;
mod command;
mod config;
mod connection;
mod context;
mod errors;
mod handlers;
mod mask;
mod mutation;
mod periodic;
mod protocol;
mod replication;
mod router;
mod script;
mod server;
mod signals;
mod storage;
mod stripes;
mod ulog;
mod utils;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Args, Config, MasterTarget};
use crate::context::ServerContext;
use crate::mask::AccessMask;
use crate::mutation::MutationWrapper;
use crate::replication::ReplicationSupervisor;
use crate::script::{NullScriptEngine, ScriptStash};
use crate::storage::hash::HashEngine;
use crate::storage::StorageEngine;
use crate::stripes::LockStripes;
use crate::ulog::UpdateLog;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let config = Config::from_args(args).context("invalid configuration")?;

    if let Some(pidfile) = &config.pidfile {
        tokio::fs::write(pidfile, format!("{}\n", std::process::id()))
            .await
            .with_context(|| format!("writing pid file {}", pidfile.display()))?;
    }

    let (ctx, target_rx) = match build_context(config).await {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "failed to initialise server");
            return Err(e.into());
        }
    };
    let ctx = Arc::new(ctx);

    signals::spawn_sighup_handler(ctx.clone());
    periodic::spawn_all(ctx.clone());
    tokio::spawn(crate::replication::follower::run(ctx.clone(), target_rx));

    info!(sid = ctx.config.sid, workers = ctx.config.workers, "tyrant-rs starting");
    server::run(ctx.clone(), signals::shutdown_signal()).await;

    if let Some(pidfile) = &ctx.config.pidfile {
        let _ = tokio::fs::remove_file(pidfile).await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn build_context(config: Config) -> crate::errors::ServerResult<(ServerContext, watch::Receiver<Option<MasterTarget>>)> {
    let storage: Arc<dyn StorageEngine> = Arc::new(HashEngine::new());
    let ulog = Arc::new(UpdateLog::open(&config.ulog_dir, config.ulog_limit_bytes, config.sid).await?);
    let stripes = Arc::new(LockStripes::new());
    let mutation = Arc::new(MutationWrapper::new(storage.clone(), ulog.clone(), stripes.clone()));
    let initial_master = config.masters.first().cloned();
    let (supervisor, target_rx) = ReplicationSupervisor::new(initial_master);

    let ctx = ServerContext {
        mask: AccessMask(config.mask),
        config,
        mutation,
        storage,
        stripes,
        ulog,
        script: Arc::new(NullScriptEngine),
        stash: Arc::new(ScriptStash::new()),
        replication: Arc::new(supervisor),
        started_at: Instant::now(),
    };
    Ok((ctx, target_rx))
}
