//! Cursor over the update log that resumes from a timestamp and tails new
//! writes (spec.md §4.7, §4.8).
//!
//! Used by both the `repl` handler (master side, streaming to a follower)
//! and anything that wants to replay history locally (`restore`). Finds the
//! earliest segment that could contain `start_ts` by probing segment file
//! names, then scans forward, filtering out any frame strictly older than
//! `start_ts`. At end-of-log it polls with capped backoff, matching "blocks
//! (with polling) when caught up" from spec.md §2.3.

use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::time::sleep;

use super::frame::UlogFrame;
use crate::errors::ServerResult;

const POLL_MIN: Duration = Duration::from_millis(20);
const POLL_MAX: Duration = Duration::from_millis(1000);

pub struct LogReader {
    dir: PathBuf,
    start_ts: u64,
    segment_no: u32,
    file: Option<File>,
    buf: Vec<u8>,
    poll_backoff: Duration,
}

impl LogReader {
    /// Opens a reader positioned to emit the first frame with
    /// `timestamp >= start_ts`. If no segments exist yet, the reader will
    /// simply poll until one appears.
    pub async fn open(dir: impl Into<PathBuf>, start_ts: u64) -> ServerResult<Self> {
        let dir = dir.into();
        let segment_no = Self::find_starting_segment(&dir, start_ts).await?.unwrap_or(1);
        Ok(Self {
            dir,
            start_ts,
            segment_no,
            file: None,
            buf: Vec::new(),
            poll_backoff: POLL_MIN,
        })
    }

    async fn find_starting_segment(dir: &std::path::Path, start_ts: u64) -> ServerResult<Option<u32>> {
        let mut segments = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".ulog") {
                    if let Ok(n) = stem.parse::<u32>() {
                        segments.push(n);
                    }
                }
            }
        }
        if segments.is_empty() {
            return Ok(None);
        }
        segments.sort_unstable();

        // Cheap probe: a segment's first frame's timestamp is a lower bound
        // for every timestamp it contains (frames are append-ordered and
        // non-decreasing). The last segment whose first timestamp is still
        // <= start_ts is where scanning must begin.
        let mut chosen = segments[0];
        for seg in &segments {
            let path = dir.join(format!("{seg:010}.ulog"));
            if let Ok(mut file) = File::open(&path).await {
                let mut head = [0u8; 9]; // magic (1) + timestamp (8)
                if file.read_exact(&mut head).await.is_ok() && head[0] == super::frame::ULOG_MAGIC {
                    let first_ts = u64::from_be_bytes(head[1..9].try_into().unwrap());
                    if first_ts <= start_ts {
                        chosen = *seg;
                        continue;
                    }
                }
            }
            break;
        }
        Ok(Some(chosen))
    }

    fn segment_path(&self, segment_no: u32) -> PathBuf {
        self.dir.join(format!("{segment_no:010}.ulog"))
    }

    async fn ensure_open(&mut self) -> ServerResult<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        match File::open(self.segment_path(self.segment_no)).await {
            Ok(f) => {
                self.file = Some(f);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Reads the next frame in order, blocking (via capped polling) until
    /// one is available. Never returns `Ok(None)` — the caller drives the
    /// poll loop and decides when to stop (e.g. connection closed).
    pub async fn next_frame(&mut self) -> ServerResult<UlogFrame> {
        loop {
            if !self.ensure_open().await? {
                self.poll_wait().await;
                continue;
            }

            if let Some((frame, consumed)) = UlogFrame::decode_prefix(&self.buf)? {
                self.buf.drain(..consumed);
                self.poll_backoff = POLL_MIN;
                if frame.timestamp >= self.start_ts {
                    return Ok(frame);
                }
                continue;
            }

            let mut chunk = [0u8; 8192];
            let n = self.file.as_mut().unwrap().read(&mut chunk).await?;
            if n > 0 {
                self.buf.extend_from_slice(&chunk[..n]);
                continue;
            }

            // EOF on current segment: move to the next one if it already
            // exists, otherwise poll this same file for more writes.
            let next_path = self.segment_path(self.segment_no + 1);
            if fs::metadata(&next_path).await.is_ok() {
                self.segment_no += 1;
                self.file = None;
                self.buf.clear();
                continue;
            }

            // Re-seek in case the writer appended between our last read
            // and now (tokio::fs::File position tracking is independent
            // per handle but we reuse one handle for the whole segment).
            let pos = self.file.as_mut().unwrap().stream_position().await?;
            self.file.as_mut().unwrap().seek(SeekFrom::Start(pos)).await?;
            self.poll_wait().await;
        }
    }

    async fn poll_wait(&mut self) {
        sleep(self.poll_backoff).await;
        self.poll_backoff = (self.poll_backoff * 2).min(POLL_MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ulog::writer::UpdateLog;

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tyrant-rs-ulogreader-test-{}", uuid::Uuid::new_v4()));
        p
    }

    #[tokio::test]
    async fn reads_frames_in_order_from_start() {
        let dir = tempdir();
        let log = UpdateLog::open(&dir, 0, 1).await.unwrap();
        for i in 0..5u8 {
            log.append(&[i]).await.unwrap();
        }

        let mut reader = LogReader::open(&dir, 0).await.unwrap();
        for i in 0..5u8 {
            let frame = reader.next_frame().await.unwrap();
            assert_eq!(frame.payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn resumes_from_a_later_timestamp() {
        let dir = tempdir();
        let log = UpdateLog::open(&dir, 0, 1).await.unwrap();
        let mut timestamps = Vec::new();
        for i in 0..5u8 {
            timestamps.push(log.append(&[i]).await.unwrap());
        }

        let resume_ts = timestamps[2];
        let mut reader = LogReader::open(&dir, resume_ts).await.unwrap();
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame.payload, vec![2]);
    }
}
