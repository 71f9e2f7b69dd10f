//! The mutation wrapper (spec.md §2.4, §4.6, §5): every backend write goes
//! through here, paired with an update-log append, "atomically from the
//! client's viewpoint". Composite read-modify-write commands additionally
//! take the key's lock stripe for the whole window, per spec.md §3's
//! stripe-exclusivity invariant.

use std::sync::Arc;

use tracing::debug;

use crate::command::Command;
use crate::errors::{ServerError, ServerResult};
use crate::stripes::LockStripes;
use crate::storage::StorageEngine;
use crate::ulog::UpdateLog;

pub struct MutationWrapper {
    storage: Arc<dyn StorageEngine>,
    ulog: Arc<UpdateLog>,
    stripes: Arc<LockStripes>,
}

impl MutationWrapper {
    pub fn new(storage: Arc<dyn StorageEngine>, ulog: Arc<UpdateLog>, stripes: Arc<LockStripes>) -> Self {
        Self { storage, ulog, stripes }
    }

    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    async fn log(&self, cmd: &Command) -> ServerResult<u64> {
        let payload = crate::command::encode_payload(cmd);
        self.ulog.append(&payload).await
    }

    /// Appends an already-originated frame during replication replay, so
    /// the local log preserves the remote's `origin_sid` instead of
    /// re-stamping it with this server's own id (spec.md §4.8).
    async fn log_with_origin(&self, cmd: &Command, origin_sid: u32) -> ServerResult<u64> {
        let payload = crate::command::encode_payload(cmd);
        self.ulog.append_with_origin(&payload, origin_sid).await
    }

    pub async fn put(&self, key: &[u8], value: &[u8]) -> ServerResult<()> {
        self.storage.put(key, value)?;
        self.log(&Command::Put { key: key.to_vec(), value: value.to_vec() }).await?;
        Ok(())
    }

    pub async fn putkeep(&self, key: &[u8], value: &[u8]) -> ServerResult<()> {
        self.storage.putkeep(key, value)?;
        self.log(&Command::PutKeep { key: key.to_vec(), value: value.to_vec() }).await?;
        Ok(())
    }

    pub async fn putcat(&self, key: &[u8], value: &[u8]) -> ServerResult<Vec<u8>> {
        let result = self.storage.putcat(key, value)?;
        self.log(&Command::PutCat { key: key.to_vec(), value: value.to_vec() }).await?;
        Ok(result)
    }

    /// `putshl`: concatenate then truncate from the left to the last
    /// `width` bytes, holding the key's stripe across both the read and
    /// the write (spec.md §4.6, §8 invariant 7). The log records the
    /// final truncated buffer as a plain `Put`, not the pre-truncation
    /// append plus width — replay must reproduce the master's actual
    /// stored bytes exactly, and recomputing the truncation from a
    /// follower's own (possibly already-diverged) local value would let
    /// drift compound instead of self-heal.
    pub async fn putshl(&self, key: &[u8], value: &[u8], width: u32) -> ServerResult<()> {
        let _guard = self.stripes.lock_for(key).await;
        let mut combined = match self.storage.get(key) {
            Ok(existing) => existing,
            Err(ServerError::NotFound) => Vec::new(),
            Err(e) => return Err(e),
        };
        combined.extend_from_slice(value);
        let width = width as usize;
        let truncated = if combined.len() > width {
            combined[combined.len() - width..].to_vec()
        } else {
            combined
        };
        self.storage.put(key, &truncated)?;
        self.log(&Command::Put { key: key.to_vec(), value: truncated }).await?;
        Ok(())
    }

    pub async fn out(&self, key: &[u8]) -> ServerResult<()> {
        self.storage.out(key)?;
        self.log(&Command::Out { key: key.to_vec() }).await?;
        Ok(())
    }

    /// `addint`: treats the stored value as a little binary `i32` counter
    /// rather than textual decimal (the textual form is the memcached
    /// dialect's own `incr`/`decr` representation, spec.md §4.6). Absent
    /// key reads as 0. `clamp` floors the sum at 0 — set by the memcached
    /// dialect's `incr`/`decr`, never by binary `addint` (spec.md §4.3,
    /// §4.6's documented asymmetry).
    pub async fn addint(&self, key: &[u8], delta: i32, clamp: bool) -> ServerResult<i32> {
        let _guard = self.stripes.lock_for(key).await;
        let current = match self.storage.get(key) {
            Ok(bytes) => decode_i32(&bytes)?,
            Err(ServerError::NotFound) => 0,
            Err(e) => return Err(e),
        };
        let sum = current.wrapping_add(delta);
        let sum = if clamp { sum.max(0) } else { sum };
        self.storage.put(key, &sum.to_be_bytes())?;
        self.log(&Command::AddInt { key: key.to_vec(), delta, clamp }).await?;
        Ok(sum)
    }

    pub async fn adddouble(&self, key: &[u8], delta: f64) -> ServerResult<f64> {
        let _guard = self.stripes.lock_for(key).await;
        let current = match self.storage.get(key) {
            Ok(bytes) => decode_f64(&bytes)?,
            Err(ServerError::NotFound) => 0.0,
            Err(e) => return Err(e),
        };
        let sum = current + delta;
        self.storage.put(key, &sum.to_be_bytes())?;
        self.log(&Command::AddDouble { key: key.to_vec(), delta }).await?;
        Ok(sum)
    }

    pub async fn vanish(&self) -> ServerResult<()> {
        self.storage.vanish()?;
        self.log(&Command::Vanish).await?;
        Ok(())
    }

    /// A `misc` call with the `mono-ulog` option: performs the backend
    /// write but deliberately skips the log append (spec.md §4.6, §5) —
    /// the caller accepts replicas will never see this mutation.
    pub async fn put_without_log(&self, key: &[u8], value: &[u8]) -> ServerResult<()> {
        self.storage.put(key, value)
    }

    /// Replays a decoded log-event `Command` during replication apply
    /// (spec.md §4.8), preserving `origin_sid` in the re-emitted local log
    /// entry so chained replication doesn't collapse provenance.
    pub async fn replay(&self, cmd: Command, origin_sid: u32) -> ServerResult<()> {
        match &cmd {
            Command::Put { key, value } => self.storage.put(key, value)?,
            Command::PutKeep { key, value } => match self.storage.putkeep(key, value) {
                Ok(()) | Err(ServerError::Conflict) => {}
                Err(e) => return Err(e),
            },
            Command::PutCat { key, value } => {
                self.storage.putcat(key, value)?;
            }
            Command::PutShl { key, value, width } => {
                let _guard = self.stripes.lock_for(key).await;
                let mut combined = self.storage.get(key).unwrap_or_default();
                combined.extend_from_slice(value);
                let width = *width as usize;
                let truncated = if combined.len() > width {
                    combined[combined.len() - width..].to_vec()
                } else {
                    combined
                };
                self.storage.put(key, &truncated)?;
            }
            Command::PutNr { key, value } => self.storage.put(key, value)?,
            Command::Out { key } => match self.storage.out(key) {
                Ok(()) | Err(ServerError::NotFound) => {}
                Err(e) => return Err(e),
            },
            Command::AddInt { key, delta, clamp } => {
                let _guard = self.stripes.lock_for(key).await;
                let current = match self.storage.get(key) {
                    Ok(bytes) => decode_i32(&bytes)?,
                    Err(ServerError::NotFound) => 0,
                    Err(e) => return Err(e),
                };
                let sum = current.wrapping_add(*delta);
                let sum = if *clamp { sum.max(0) } else { sum };
                self.storage.put(key, &sum.to_be_bytes())?;
            }
            Command::AddDouble { key, delta } => {
                let _guard = self.stripes.lock_for(key).await;
                let current = match self.storage.get(key) {
                    Ok(bytes) => decode_f64(&bytes)?,
                    Err(ServerError::NotFound) => 0.0,
                    Err(e) => return Err(e),
                };
                self.storage.put(key, &(current + delta).to_be_bytes())?;
            }
            Command::Vanish => self.storage.vanish()?,
            other => {
                debug!(?other, "ignoring non-replayable command from replication stream");
                return Ok(());
            }
        }
        self.log_with_origin(&cmd, origin_sid).await?;
        Ok(())
    }
}

fn decode_i32(bytes: &[u8]) -> ServerResult<i32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| ServerError::backend("stored value is not a 4-byte integer counter"))?;
    Ok(i32::from_be_bytes(arr))
}

fn decode_f64(bytes: &[u8]) -> ServerResult<f64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ServerError::backend("stored value is not an 8-byte double counter"))?;
    Ok(f64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hash::HashEngine;
    use std::path::PathBuf;

    async fn wrapper() -> (MutationWrapper, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("tyrant-rs-mutation-test-{}", uuid::Uuid::new_v4()));
        let ulog = Arc::new(UpdateLog::open(&dir, 0, 1).await.unwrap());
        let storage: Arc<dyn StorageEngine> = Arc::new(HashEngine::new());
        let stripes = Arc::new(LockStripes::new());
        (MutationWrapper::new(storage, ulog, stripes), dir)
    }

    #[tokio::test]
    async fn put_then_get() {
        let (w, _dir) = wrapper().await;
        w.put(b"k", b"v").await.unwrap();
        assert_eq!(w.storage().get(b"k").unwrap(), b"v");
    }

    #[tokio::test]
    async fn putshl_keeps_only_tail_width() {
        let (w, _dir) = wrapper().await;
        w.put(b"x", b"0123456789").await.unwrap();
        w.putshl(b"x", b"ABCDE", 8).await.unwrap();
        // "0123456789ABCDE" kept to the last 8 bytes.
        assert_eq!(w.storage().get(b"x").unwrap(), b"789ABCDE");
    }

    #[tokio::test]
    async fn addint_accumulates() {
        let (w, _dir) = wrapper().await;
        assert_eq!(w.addint(b"n", 5, false).await.unwrap(), 5);
        assert_eq!(w.addint(b"n", -2, false).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn addint_does_not_clamp_negative() {
        let (w, _dir) = wrapper().await;
        assert_eq!(w.addint(b"n", -5, false).await.unwrap(), -5);
    }

    #[tokio::test]
    async fn addint_clamps_negative_when_requested() {
        let (w, _dir) = wrapper().await;
        assert_eq!(w.addint(b"n", -5, true).await.unwrap(), 0);
        assert_eq!(w.storage().get(b"n").unwrap(), 0i32.to_be_bytes());
    }
}
