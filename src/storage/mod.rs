//! The storage backend contract (spec.md §6.4) and the one concrete engine
//! this crate ships.
//!
//! The backend is an external collaborator: hash/B+-tree/fixed-length/table
//! engines in the original server are all interchangeable behind the same
//! operation set. Modelling it as a trait object keeps the core (router,
//! handlers, mutation wrapper, replication) entirely ignorant of which one
//! is plugged in, matching how the teacher's `EventSink` trait lets
//! `server.rs` stay agnostic of hook0 vs. plain HTTP vs. stdout.

pub mod hash;

use crate::errors::ServerResult;

/// Operations the core calls against the backend. `iterinit`/`iternext`
/// share one process-wide cursor per spec.md §3 — deliberately imprecise
/// under concurrent writes, not a bug to fix.
pub trait StorageEngine: Send + Sync {
    /// Unconditional store; overwrites any existing value.
    fn put(&self, key: &[u8], value: &[u8]) -> ServerResult<()>;

    /// Store only if `key` is absent. Returns `Err(Conflict)` otherwise.
    fn putkeep(&self, key: &[u8], value: &[u8]) -> ServerResult<()>;

    /// Appends `value` to the existing record, or stores it verbatim if
    /// absent. Returns the new, concatenated value.
    fn putcat(&self, key: &[u8], value: &[u8]) -> ServerResult<Vec<u8>>;

    fn out(&self, key: &[u8]) -> ServerResult<()>;

    fn get(&self, key: &[u8]) -> ServerResult<Vec<u8>>;

    fn vsiz(&self, key: &[u8]) -> ServerResult<u32>;

    /// Resets the process-wide iterator cursor to the first key.
    fn iterinit(&self) -> ServerResult<()>;

    /// Advances the cursor by one key and returns it, or `Err(NotFound)` at
    /// end of traversal.
    fn iternext(&self) -> ServerResult<Vec<u8>>;

    /// First `max` keys (or all, if `max < 0`) whose bytes start with
    /// `prefix`. Order is backend-defined (spec.md §6.4).
    fn fwmkeys(&self, prefix: &[u8], max: i64) -> ServerResult<Vec<Vec<u8>>>;

    fn rnum(&self) -> u64;

    /// Approximate on-disk (or in-memory) footprint in bytes.
    fn size(&self) -> u64;

    /// Removes every record.
    fn vanish(&self) -> ServerResult<()>;

    /// Copies the backend's persisted files to `path`.
    fn copy(&self, path: &str) -> ServerResult<()>;

    /// A short tag identifying the concrete engine (hash/btree/fixed/table)
    /// for the `stat` handler's status block.
    fn mode_tag(&self) -> &'static str;
}
