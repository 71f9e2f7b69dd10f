//! Segmented, append-only update log writer (spec.md §4.7).
//!
//! Segments are named `{:010}.ulog` starting at `0000000001`; a new segment
//! opens once the current one exceeds `limit_bytes` (0 = unlimited). One
//! `tokio::sync::Mutex` serialises appends — "the log's write lock" from
//! spec.md §4.7 — and SIGHUP-triggered log rotation (spec.md §4.1) closes
//! and reopens the current segment without disturbing the segment number.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::frame::UlogFrame;
use crate::errors::{ServerError, ServerResult};
use crate::utils::timestamp::MonotonicClock;

struct WriterState {
    file: File,
    segment_no: u32,
    segment_size: u64,
}

pub struct UpdateLog {
    dir: PathBuf,
    limit_bytes: u64,
    origin_sid: u32,
    clock: MonotonicClock,
    state: Mutex<WriterState>,
    /// Mirrors `state.segment_no` for lock-free reads from the `stat`
    /// handler and tests; the mutex remains the source of truth for writes.
    segment_no_hint: AtomicU32,
}

fn segment_path(dir: &Path, segment_no: u32) -> PathBuf {
    dir.join(format!("{segment_no:010}.ulog"))
}

impl UpdateLog {
    /// Opens (creating if necessary) the log directory and resumes
    /// appending to the highest-numbered existing segment, or starts a
    /// fresh `0000000001.ulog` if the directory is empty.
    pub async fn open(dir: impl Into<PathBuf>, limit_bytes: u64, origin_sid: u32) -> ServerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut highest = 0u32;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".ulog") {
                    if let Ok(n) = stem.parse::<u32>() {
                        highest = highest.max(n);
                    }
                }
            }
        }
        let segment_no = if highest == 0 { 1 } else { highest };
        let path = segment_path(&dir, segment_no);
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let segment_size = file.metadata().await?.len();

        info!(segment = segment_no, size = segment_size, "opened update log");

        Ok(Self {
            dir,
            limit_bytes,
            origin_sid,
            clock: MonotonicClock::new(),
            state: Mutex::new(WriterState { file, segment_no, segment_size }),
            segment_no_hint: AtomicU32::new(segment_no),
        })
    }

    pub fn origin_sid(&self) -> u32 {
        self.origin_sid
    }

    pub fn current_segment(&self) -> u32 {
        self.segment_no_hint.load(Ordering::Relaxed)
    }

    /// Appends `payload` as one frame, stamped with the next monotonic
    /// timestamp and this server's `origin_sid`. Returns the timestamp
    /// actually used, so callers (the mutation wrapper) can thread it
    /// through to replication state bookkeeping.
    pub async fn append(&self, payload: &[u8]) -> ServerResult<u64> {
        self.append_with_origin(payload, self.origin_sid).await
    }

    /// Appends a frame carrying a caller-supplied origin sid, used by the
    /// replication follower so replayed events keep their original
    /// provenance instead of being re-stamped with this server's id
    /// (spec.md §4.8).
    pub async fn append_with_origin(&self, payload: &[u8], origin_sid: u32) -> ServerResult<u64> {
        if payload.len() > crate::command::MAX_PAYLOAD_LEN {
            return Err(ServerError::invalid_input("update-log payload too large"));
        }
        let timestamp = self.clock.next();
        let frame = UlogFrame { timestamp, origin_sid, payload: payload.to_vec() };
        let bytes = frame.encode();

        let mut state = self.state.lock().await;
        state.file.write_all(&bytes).await?;
        state.file.flush().await?;
        state.segment_size += bytes.len() as u64;

        if self.limit_bytes > 0 && state.segment_size > self.limit_bytes {
            self.roll_segment(&mut state).await?;
        }
        Ok(timestamp)
    }

    async fn roll_segment(&self, state: &mut WriterState) -> ServerResult<()> {
        let next_no = state.segment_no + 1;
        let path = segment_path(&self.dir, next_no);
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        state.file = file;
        state.segment_no = next_no;
        state.segment_size = 0;
        self.segment_no_hint.store(next_no, Ordering::Relaxed);
        debug!(segment = next_no, "rolled update log segment");
        Ok(())
    }

    /// SIGHUP handling (spec.md §4.1): close and reopen the current
    /// segment file, e.g. after an external log-rotation tool renamed it.
    pub async fn reopen(&self) -> ServerResult<()> {
        let mut state = self.state.lock().await;
        let path = segment_path(&self.dir, state.segment_no);
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let size = file.metadata().await?.len();
        state.file = file;
        state.segment_size = size;
        info!(segment = state.segment_no, "reopened update log after SIGHUP");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_increase_segment_size_and_rotate() {
        let dir = tempdir();
        let log = UpdateLog::open(&dir, 40, 1).await.unwrap();
        for _ in 0..5 {
            log.append(b"0123456789").await.unwrap();
        }
        assert!(log.current_segment() > 1);
    }

    #[tokio::test]
    async fn timestamps_are_strictly_increasing() {
        let dir = tempdir();
        let log = UpdateLog::open(&dir, 0, 1).await.unwrap();
        let mut prev = log.append(b"a").await.unwrap();
        for _ in 0..50 {
            let ts = log.append(b"a").await.unwrap();
            assert!(ts > prev);
            prev = ts;
        }
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tyrant-rs-ulog-test-{}", uuid::Uuid::new_v4()));
        p
    }
}
