//! Handlers: one function per logical operation (spec.md §4.6), each taking
//! the already access-mask-checked [`Command`] and the shared
//! [`ServerContext`]. Write handlers call through [`MutationWrapper`]; read
//! handlers touch [`StorageEngine`] directly and never the log.
//!
//! Handlers return a dialect-agnostic [`Outcome`]; translating that into
//! binary/text/HTTP wire bytes is the connection loop's job, not the
//! handler's — the same separation the teacher keeps between parsed
//! replication messages and their `EventSink` serialisation.

use std::sync::Arc;

use tracing::instrument;

use crate::command::{Command, EXT_OPT_GLOBAL_LOCK, EXT_OPT_RECORD_LOCK, MISC_OPT_MONO_ULOG};
use crate::context::ServerContext;
use crate::errors::{ServerError, ServerResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unit,
    Value(Vec<u8>),
    U32(u32),
    I32(i32),
    F64(f64),
    U64(u64),
    Text(String),
    KeyList(Vec<Vec<u8>>),
    Mget(Vec<(Vec<u8>, Vec<u8>)>),
    /// `putnr`: no response frame at all.
    NoReply,
}

/// Dispatches every non-streaming command. `Command::Repl` is handled
/// separately by [`crate::handlers::repl::stream`] since it needs direct
/// access to the connection's writer; callers must not route it here.
#[instrument(skip(ctx, cmd), fields(cmd = ?std::mem::discriminant(&cmd)))]
pub async fn dispatch(ctx: &ServerContext, cmd: Command) -> ServerResult<Outcome> {
    match cmd {
        Command::Put { key, value } => {
            ctx.mutation.put(&key, &value).await?;
            Ok(Outcome::Unit)
        }
        Command::PutKeep { key, value } => {
            ctx.mutation.putkeep(&key, &value).await?;
            Ok(Outcome::Unit)
        }
        Command::PutCat { key, value } => {
            ctx.mutation.putcat(&key, &value).await?;
            Ok(Outcome::Unit)
        }
        Command::PutShl { key, value, width } => {
            ctx.mutation.putshl(&key, &value, width).await?;
            Ok(Outcome::Unit)
        }
        Command::PutNr { key, value } => {
            ctx.mutation.put(&key, &value).await?;
            Ok(Outcome::NoReply)
        }
        Command::Out { key } => {
            ctx.mutation.out(&key).await?;
            Ok(Outcome::Unit)
        }
        Command::Get { key } => Ok(Outcome::Value(ctx.storage.get(&key)?)),
        Command::Mget { keys } => {
            let mut pairs = Vec::new();
            for key in keys {
                if let Ok(value) = ctx.storage.get(&key) {
                    pairs.push((key, value));
                }
            }
            Ok(Outcome::Mget(pairs))
        }
        Command::Vsiz { key } => Ok(Outcome::U32(ctx.storage.vsiz(&key)?)),
        Command::IterInit => {
            ctx.storage.iterinit()?;
            Ok(Outcome::Unit)
        }
        Command::IterNext => Ok(Outcome::Value(ctx.storage.iternext()?)),
        Command::Fwmkeys { prefix, max } => Ok(Outcome::KeyList(ctx.storage.fwmkeys(&prefix, max)?)),
        Command::AddInt { key, delta, clamp } => {
            Ok(Outcome::I32(ctx.mutation.addint(&key, delta, clamp).await?))
        }
        Command::AddDouble { key, delta } => Ok(Outcome::F64(ctx.mutation.adddouble(&key, delta).await?)),
        Command::Ext { name, opts, key, value } => ext(ctx, &name, opts, &key, &value).await,
        Command::Sync => {
            // The in-memory engine has nothing to flush; a disk-backed
            // engine would fsync its file here.
            Ok(Outcome::Unit)
        }
        Command::Vanish => {
            ctx.mutation.vanish().await?;
            Ok(Outcome::Unit)
        }
        Command::Copy { path } => copy(ctx, &path).await,
        Command::Restore { path, ts, check } => restore(ctx, &path, ts, check).await,
        Command::Setmst { host, port } => setmst(ctx, host, port),
        Command::Rnum => Ok(Outcome::U64(ctx.storage.rnum())),
        Command::Size => Ok(Outcome::U64(ctx.storage.size())),
        Command::Stat => Ok(Outcome::Text(stat(ctx))),
        Command::Misc { name, opts, args } => misc(ctx, &name, opts, args).await,
        Command::Repl { .. } => {
            Err(ServerError::invalid_input("repl must be dispatched through the streaming handler"))
        }
    }
}

/// `ext(name, opts, k, v)` (spec.md §4.6): record-lock holds just
/// `stripe[h(k)]`; global-lock acquires every stripe ascending, releasing
/// descending, the one place all stripes are held simultaneously.
async fn ext(ctx: &ServerContext, name: &str, opts: i32, key: &[u8], value: &[u8]) -> ServerResult<Outcome> {
    if opts & EXT_OPT_GLOBAL_LOCK != 0 {
        let _guards = ctx.stripes.lock_all().await;
        let result = ctx.script.call(name, key, value).await?;
        Ok(Outcome::Value(result))
    } else if opts & EXT_OPT_RECORD_LOCK != 0 {
        let _guard = ctx.stripes.lock_for(key).await;
        let result = ctx.script.call(name, key, value).await?;
        Ok(Outcome::Value(result))
    } else {
        let result = ctx.script.call(name, key, value).await?;
        Ok(Outcome::Value(result))
    }
}

/// `copy(path)`: a leading `@` runs the remainder as a shell command after
/// snapshotting (spec.md §4.6); otherwise the backend's files are copied
/// to `path` verbatim.
async fn copy(ctx: &ServerContext, path: &str) -> ServerResult<Outcome> {
    if let Some(shell_cmd) = path.strip_prefix('@') {
        ctx.storage.copy(path)?;
        let status = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(shell_cmd)
            .status()
            .await
            .map_err(|e| ServerError::backend(format!("copy shell command failed: {e}")))?;
        if !status.success() {
            return Err(ServerError::backend(format!("copy shell command exited with {status}")));
        }
    } else {
        ctx.storage.copy(path)?;
    }
    Ok(Outcome::Unit)
}

/// `restore(path, ts[, +])`: replays log segments under `path` from `ts`
/// onward through the mutation wrapper, preserving each event's own
/// `origin_sid` (spec.md §4.6, §4.7). `check` (no leading `+`) would
/// additionally verify segment integrity before replay; the in-memory
/// backend has no on-disk consistency state to check against, so `check`
/// is accepted but has no extra effect here.
async fn restore(ctx: &ServerContext, path: &str, ts: u64, _check: bool) -> ServerResult<Outcome> {
    let mut reader = crate::ulog::LogReader::open(path, ts).await?;
    loop {
        tokio::select! {
            frame = reader.next_frame() => {
                let frame = frame?;
                let cmd = crate::command::decode_payload(&frame.payload)?;
                ctx.mutation.replay(cmd, frame.origin_sid).await?;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                // No more frames arrived within one short window: treat the
                // segment directory as exhausted rather than tailing it
                // forever, since restore is a one-shot replay, not a live
                // follower.
                break;
            }
        }
    }
    Ok(Outcome::Unit)
}

/// `setmst(host, port)`: mutates the follower's target atomically; an
/// empty host stops replication (spec.md §4.6).
fn setmst(ctx: &ServerContext, host: String, port: u32) -> ServerResult<Outcome> {
    let target = if host.is_empty() {
        None
    } else {
        let port: u16 = port
            .try_into()
            .map_err(|_| ServerError::invalid_input("port out of range"))?;
        Some(crate::config::MasterTarget { host, port })
    };
    ctx.replication.set_target(target);
    Ok(Outcome::Unit)
}

fn stat(ctx: &ServerContext) -> String {
    let uptime = ctx.started_at.elapsed().as_secs();
    let master = ctx.replication.current();
    let mut lines = vec![
        format!("version\t{}", env!("CARGO_PKG_VERSION")),
        format!("pid\t{}", std::process::id()),
        format!("sid\t{}", ctx.config.sid),
        format!("type\t{}", ctx.storage.mode_tag()),
        format!("rnum\t{}", ctx.storage.rnum()),
        format!("size\t{}", ctx.storage.size()),
        format!("bigend\t{}", if cfg!(target_endian = "big") { 1 } else { 0 }),
        format!("uptime\t{uptime}"),
    ];
    if let Some(m) = master {
        lines.push(format!("master_host\t{}", m.host));
        lines.push(format!("master_port\t{}", m.port));
    }
    lines.join("\n") + "\n"
}

/// `misc(name, opts, args)` (spec.md §4.6): a generic escape hatch.
/// `putlist`/`outlist`/`getlist` are universal; anything else is dispatched
/// as a single-record op recognised from the core command set. `opts` bit
/// `mono-ulog` suppresses the log event for any write performed here.
async fn misc(ctx: &ServerContext, name: &str, opts: i32, args: Vec<Vec<u8>>) -> ServerResult<Outcome> {
    let mono_ulog = opts & MISC_OPT_MONO_ULOG != 0;
    match name {
        "putlist" => {
            let mut iter = args.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                if mono_ulog {
                    ctx.mutation.put_without_log(&key, &value).await?;
                } else {
                    ctx.mutation.put(&key, &value).await?;
                }
            }
            Ok(Outcome::Unit)
        }
        "outlist" => {
            for key in args {
                // Best-effort: absent keys are simply skipped, matching
                // "putlist/outlist/getlist are universal" bulk semantics.
                let _ = ctx.mutation.out(&key).await;
            }
            Ok(Outcome::Unit)
        }
        "getlist" => {
            let mut found = Vec::new();
            for key in args {
                if let Ok(value) = ctx.storage.get(&key) {
                    found.push(value);
                }
            }
            Ok(Outcome::KeyList(found))
        }
        "put" => {
            let (key, value) = two_args(args)?;
            if mono_ulog {
                ctx.mutation.put_without_log(&key, &value).await?;
            } else {
                ctx.mutation.put(&key, &value).await?;
            }
            Ok(Outcome::Unit)
        }
        "putkeep" => {
            let (key, value) = two_args(args)?;
            ctx.mutation.putkeep(&key, &value).await?;
            Ok(Outcome::Unit)
        }
        "putcat" => {
            let (key, value) = two_args(args)?;
            ctx.mutation.putcat(&key, &value).await?;
            Ok(Outcome::Unit)
        }
        "out" => {
            let key = one_arg(args)?;
            ctx.mutation.out(&key).await?;
            Ok(Outcome::Unit)
        }
        "get" => {
            let key = one_arg(args)?;
            Ok(Outcome::Value(ctx.storage.get(&key)?))
        }
        other => Err(ServerError::backend(format!("unsupported misc subcommand {other:?}"))),
    }
}

fn one_arg(mut args: Vec<Vec<u8>>) -> ServerResult<Vec<u8>> {
    if args.is_empty() {
        return Err(ServerError::invalid_input("misc subcommand requires one argument"));
    }
    Ok(args.remove(0))
}

fn two_args(mut args: Vec<Vec<u8>>) -> ServerResult<(Vec<u8>, Vec<u8>)> {
    if args.len() < 2 {
        return Err(ServerError::invalid_input("misc subcommand requires two arguments"));
    }
    let value = args.remove(1);
    let key = args.remove(0);
    Ok((key, value))
}

pub mod repl;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindTarget, Config};
    use crate::mask::AccessMask;
    use crate::mutation::MutationWrapper;
    use crate::replication::ReplicationSupervisor;
    use crate::script::{NullScriptEngine, ScriptStash};
    use crate::storage::hash::HashEngine;
    use crate::storage::StorageEngine;
    use crate::stripes::LockStripes;
    use crate::ulog::UpdateLog;
    use std::time::Instant;

    async fn test_context() -> ServerContext {
        let mut dir = std::env::temp_dir();
        dir.push(format!("tyrant-rs-handlers-test-{}", uuid::Uuid::new_v4()));
        let ulog = Arc::new(UpdateLog::open(&dir, 0, 1).await.unwrap());
        let storage: Arc<dyn StorageEngine> = Arc::new(HashEngine::new());
        let stripes = Arc::new(LockStripes::new());
        let mutation = Arc::new(MutationWrapper::new(storage.clone(), ulog.clone(), stripes.clone()));
        let (supervisor, _rx) = ReplicationSupervisor::new(None);
        ServerContext {
            config: Config {
                bind: BindTarget::Tcp("127.0.0.1:0".parse().unwrap()),
                workers: 8,
                timeout_secs: 0,
                ulog_dir: dir,
                ulog_limit_bytes: 0,
                sid: 1,
                mask: 0,
                masters: vec![],
                pidfile: None,
            },
            mutation,
            storage,
            stripes,
            ulog,
            script: Arc::new(NullScriptEngine),
            stash: Arc::new(ScriptStash::new()),
            mask: AccessMask::none(),
            replication: Arc::new(supervisor),
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let ctx = test_context().await;
        dispatch(&ctx, Command::Put { key: b"k".to_vec(), value: b"v".to_vec() }).await.unwrap();
        let outcome = dispatch(&ctx, Command::Get { key: b"k".to_vec() }).await.unwrap();
        assert_eq!(outcome, Outcome::Value(b"v".to_vec()));
    }

    #[tokio::test]
    async fn putkeep_conflicts_surfaces_as_error() {
        let ctx = test_context().await;
        dispatch(&ctx, Command::Put { key: b"k".to_vec(), value: b"v".to_vec() }).await.unwrap();
        let err = dispatch(&ctx, Command::PutKeep { key: b"k".to_vec(), value: b"v2".to_vec() })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict));
    }

    #[tokio::test]
    async fn mget_skips_missing_keys() {
        let ctx = test_context().await;
        dispatch(&ctx, Command::Put { key: b"a".to_vec(), value: b"1".to_vec() }).await.unwrap();
        let outcome = dispatch(&ctx, Command::Mget { keys: vec![b"a".to_vec(), b"missing".to_vec()] })
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Mget(vec![(b"a".to_vec(), b"1".to_vec())]));
    }

    #[tokio::test]
    async fn ext_under_global_lock_invokes_script_engine() {
        let ctx = test_context().await;
        let err = dispatch(
            &ctx,
            Command::Ext {
                name: "myfunc".to_string(),
                opts: EXT_OPT_GLOBAL_LOCK,
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Script(_)));
    }

    #[tokio::test]
    async fn setmst_updates_replication_target() {
        let ctx = test_context().await;
        dispatch(&ctx, Command::Setmst { host: "master.example".to_string(), port: 1978 })
            .await
            .unwrap();
        let current = ctx.replication.current().unwrap();
        assert_eq!(current.host, "master.example");
        assert_eq!(current.port, 1978);
    }

    #[tokio::test]
    async fn misc_putlist_stores_every_pair() {
        let ctx = test_context().await;
        dispatch(
            &ctx,
            Command::Misc {
                name: "putlist".to_string(),
                opts: 0,
                args: vec![b"a".to_vec(), b"1".to_vec(), b"b".to_vec(), b"2".to_vec()],
            },
        )
        .await
        .unwrap();
        assert_eq!(ctx.storage.get(b"a").unwrap(), b"1");
        assert_eq!(ctx.storage.get(b"b").unwrap(), b"2");
    }
}
