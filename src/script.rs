//! Scripting extension hook (spec.md §4.9).
//!
//! The scripting runtime itself (Lua in the reference server) is an
//! external collaborator — this crate only owns the dispatch surface and
//! the shared stash the stripe array guards. [`NullScriptEngine`] is the
//! shipped default: it exercises the full `ext` locking/dispatch path
//! without embedding a real interpreter.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::{ServerError, ServerResult};

#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Invokes the named script function with `(key, value)`, returning its
    /// result bytes. Locking (record vs. global) is the caller's
    /// responsibility — this trait only runs the function body.
    async fn call(&self, name: &str, key: &[u8], value: &[u8]) -> ServerResult<Vec<u8>>;

    /// Named periodic functions this engine wants invoked on a timer, paired
    /// with their interval (spec.md §4.9: "a set of named periodic
    /// functions"). Empty by default — most engines have none.
    fn periodic_functions(&self) -> Vec<(String, Duration)> {
        Vec::new()
    }
}

/// No scripting runtime configured. Every call fails with
/// [`ServerError::Script`], matching the reference server's behaviour when
/// built without Lua support.
pub struct NullScriptEngine;

#[async_trait]
impl ScriptEngine for NullScriptEngine {
    async fn call(&self, name: &str, _key: &[u8], _value: &[u8]) -> ServerResult<Vec<u8>> {
        Err(ServerError::script(format!("no script engine configured (function {name:?})")))
    }
}

/// Key/value scratch space shared across script invocations (spec.md
/// §4.9.ii), guarded externally by the same stripe array used for
/// record/global locks so `ext` already holds the right lock when it
/// touches the stash.
#[derive(Default)]
pub struct ScriptStash {
    values: Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl ScriptStash {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: String, value: Vec<u8>) {
        self.values.lock().await.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_engine_always_errors() {
        let engine = NullScriptEngine;
        let err = engine.call("myfunc", b"k", b"v").await.unwrap_err();
        assert!(matches!(err, ServerError::Script(_)));
    }

    #[tokio::test]
    async fn stash_round_trips() {
        let stash = ScriptStash::new();
        stash.set("a".to_string(), b"1".to_vec()).await;
        assert_eq!(stash.get("a").await, Some(b"1".to_vec()));
        assert_eq!(stash.get("missing").await, None);
    }
}
