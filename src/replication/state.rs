//! Replication state file: the follower's last-applied timestamp (spec.md
//! §2.3, §6.6), persisted after each successful apply so a restarted
//! follower resumes rather than replaying its master's whole log.
//!
//! Written via temp-file-then-rename so a crash mid-write never leaves a
//! corrupt state file behind — the reference server overwrites in place,
//! which this port deliberately improves on (see DESIGN.md).

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ServerResult;

pub struct ReplState {
    path: PathBuf,
}

impl ReplState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the persisted timestamp, or 0 if the state file doesn't exist
    /// yet (a fresh follower starts tailing from the beginning of time).
    pub async fn load(&self) -> ServerResult<u64> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn store(&self, ts: u64) -> ServerResult<()> {
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, ts.to_string()).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempfile() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tyrant-rs-replstate-test-{}", uuid::Uuid::new_v4()));
        p
    }

    #[tokio::test]
    async fn missing_file_reads_as_zero() {
        let state = ReplState::new(tempfile());
        assert_eq!(state.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let path = tempfile();
        let state = ReplState::new(&path);
        state.store(42).await.unwrap();
        assert_eq!(state.load().await.unwrap(), 42);
        assert!(!tmp_path_for(&path).exists());
    }
}
