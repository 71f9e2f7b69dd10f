//! In-memory hash-table storage engine.
//!
//! Stands in for the original server's on-disk hash database: a
//! concurrent-reader / single-writer map guarded by a single `RwLock`, with
//! the core's lock stripes (`crate::stripes`) layered on top for composite
//! read-modify-write commands. `StorageEngine::put`/`get`/etc. here are each
//! already atomic with respect to one another; they just aren't atomic
//! *across* a get-then-put pair, which is exactly why the stripe array
//! exists (spec.md §3, §5).

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use super::StorageEngine;
use crate::errors::{ServerError, ServerResult};

/// Snapshot-based iterator cursor. Taken once at `iterinit`, consumed one
/// key at a time by `iternext`; if the map changes in between, the
/// traversal silently diverges from current state. That imprecision is
/// documented in spec.md §3/§7 as intentional, not a defect.
#[derive(Default)]
struct IterCursor {
    keys: Vec<Vec<u8>>,
    pos: usize,
}

pub struct HashEngine {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    cursor: Mutex<IterCursor>,
}

impl HashEngine {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            cursor: Mutex::new(IterCursor::default()),
        }
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for HashEngine {
    fn put(&self, key: &[u8], value: &[u8]) -> ServerResult<()> {
        let mut records = self.records.write().unwrap();
        records.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn putkeep(&self, key: &[u8], value: &[u8]) -> ServerResult<()> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(key) {
            return Err(ServerError::Conflict);
        }
        records.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn putcat(&self, key: &[u8], value: &[u8]) -> ServerResult<Vec<u8>> {
        let mut records = self.records.write().unwrap();
        let entry = records.entry(key.to_vec()).or_default();
        entry.extend_from_slice(value);
        Ok(entry.clone())
    }

    fn out(&self, key: &[u8]) -> ServerResult<()> {
        let mut records = self.records.write().unwrap();
        records.remove(key).map(|_| ()).ok_or(ServerError::NotFound)
    }

    fn get(&self, key: &[u8]) -> ServerResult<Vec<u8>> {
        let records = self.records.read().unwrap();
        records.get(key).cloned().ok_or(ServerError::NotFound)
    }

    fn vsiz(&self, key: &[u8]) -> ServerResult<u32> {
        let records = self.records.read().unwrap();
        records
            .get(key)
            .map(|v| v.len() as u32)
            .ok_or(ServerError::NotFound)
    }

    fn iterinit(&self) -> ServerResult<()> {
        let records = self.records.read().unwrap();
        let mut cursor = self.cursor.lock().unwrap();
        cursor.keys = records.keys().cloned().collect();
        cursor.pos = 0;
        Ok(())
    }

    fn iternext(&self) -> ServerResult<Vec<u8>> {
        let mut cursor = self.cursor.lock().unwrap();
        if cursor.pos >= cursor.keys.len() {
            return Err(ServerError::NotFound);
        }
        let key = cursor.keys[cursor.pos].clone();
        cursor.pos += 1;
        Ok(key)
    }

    fn fwmkeys(&self, prefix: &[u8], max: i64) -> ServerResult<Vec<Vec<u8>>> {
        let records = self.records.read().unwrap();
        let mut matches: Vec<Vec<u8>> = records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        if max >= 0 {
            matches.truncate(max as usize);
        }
        Ok(matches)
    }

    fn rnum(&self) -> u64 {
        self.records.read().unwrap().len() as u64
    }

    fn size(&self) -> u64 {
        let records = self.records.read().unwrap();
        records
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }

    fn vanish(&self) -> ServerResult<()> {
        self.records.write().unwrap().clear();
        Ok(())
    }

    fn copy(&self, _path: &str) -> ServerResult<()> {
        // The in-memory engine has no on-disk files of its own to copy;
        // a real hash/btree engine would fsync and hard-link/copy them here.
        Ok(())
    }

    fn mode_tag(&self) -> &'static str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let e = HashEngine::new();
        e.put(b"k", b"v").unwrap();
        assert_eq!(e.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn putkeep_conflicts_on_existing() {
        let e = HashEngine::new();
        e.put(b"k", b"v").unwrap();
        assert!(matches!(e.putkeep(b"k", b"v2"), Err(ServerError::Conflict)));
        assert_eq!(e.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn putcat_appends() {
        let e = HashEngine::new();
        e.put(b"k", b"ab").unwrap();
        let out = e.putcat(b"k", b"cd").unwrap();
        assert_eq!(out, b"abcd");
        assert_eq!(e.get(b"k").unwrap(), b"abcd");
    }

    #[test]
    fn fwmkeys_respects_max() {
        let e = HashEngine::new();
        for i in 0..5 {
            e.put(format!("pre{i}").as_bytes(), b"x").unwrap();
        }
        e.put(b"other", b"x").unwrap();
        let matches = e.fwmkeys(b"pre", 3).unwrap();
        assert_eq!(matches.len(), 3);
        let all = e.fwmkeys(b"pre", -1).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn iterator_walks_every_key_once() {
        let e = HashEngine::new();
        for i in 0..10 {
            e.put(format!("k{i}").as_bytes(), b"x").unwrap();
        }
        e.iterinit().unwrap();
        let mut seen = 0;
        while e.iternext().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 10);
    }
}
