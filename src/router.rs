//! Command router and access mask (spec.md §4.5).
//!
//! Selects a handler by `Command` and tests the mask before ever touching
//! the backend — "the bucket ∨ per-command bit test happens before any
//! backend call" is the one hard invariant here (spec.md §8 invariant 8).

use crate::command::Command;
use crate::context::ServerContext;
use crate::errors::{ServerError, ServerResult};
use crate::handlers::{self, Outcome};
use crate::mask::{AccessMask, Dialect};

/// Checks the access mask, then dispatches. Returns `Err(Forbidden)`
/// without any backend call if the command is masked off. Callers handling
/// `Command::Repl` must still call this first (for the mask check) and
/// then drive [`crate::handlers::repl::stream`] themselves — this function
/// rejects `Repl` only because it has no non-streaming `Outcome` to return.
pub async fn route(ctx: &ServerContext, cmd: Command, dialect: Dialect) -> ServerResult<Outcome> {
    let mask = AccessMask(ctx.mask.0);
    if mask.forbids(&cmd, dialect) {
        return Err(ServerError::Forbidden);
    }
    handlers::dispatch(ctx, cmd).await
}

/// Just the mask check, for callers (the `repl` path) that need to gate a
/// command before driving its own handler instead of going through
/// [`route`].
pub fn check_mask(ctx: &ServerContext, cmd: &Command, dialect: Dialect) -> ServerResult<()> {
    let mask = AccessMask(ctx.mask.0);
    if mask.forbids(cmd, dialect) {
        return Err(ServerError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BindTarget, Config};
    use crate::mask::MSK_ALL_WRITE;
    use crate::mutation::MutationWrapper;
    use crate::replication::ReplicationSupervisor;
    use crate::script::{NullScriptEngine, ScriptStash};
    use crate::storage::hash::HashEngine;
    use crate::storage::StorageEngine;
    use crate::stripes::LockStripes;
    use crate::ulog::UpdateLog;
    use std::sync::Arc;
    use std::time::Instant;

    async fn test_context(mask: u64) -> ServerContext {
        let mut dir = std::env::temp_dir();
        dir.push(format!("tyrant-rs-router-test-{}", uuid::Uuid::new_v4()));
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
                mask,
                masters: vec![],
                pidfile: None,
            },
            mutation,
            storage,
            stripes,
            ulog,
            script: Arc::new(NullScriptEngine),
            stash: Arc::new(ScriptStash::new()),
            mask: AccessMask(mask),
            replication: Arc::new(supervisor),
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn forbidden_write_never_touches_backend() {
        let ctx = test_context(MSK_ALL_WRITE).await;
        let err = route(&ctx, Command::Put { key: b"k".to_vec(), value: b"v".to_vec() }, Dialect::Binary)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden));
        assert_eq!(ctx.storage.rnum(), 0);
    }

    #[tokio::test]
    async fn unmasked_command_reaches_the_handler() {
        let ctx = test_context(0).await;
        route(&ctx, Command::Put { key: b"k".to_vec(), value: b"v".to_vec() }, Dialect::Binary)
            .await
            .unwrap();
        assert_eq!(ctx.storage.rnum(), 1);
    }
}
