//! Download state: the watermark plus progress through the log file being drained.
//! Optionally checkpointed to a JSON file so a restart resumes instead of re-listing from zero.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that asks the source for a file from its first byte.
pub const BEGINNING_MARKER: &str = "0";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadState {
    // lastWritten of the last fully drained file, as reported by the server
    watermark: i64,
    // file currently being drained; empty when none
    current_file: String,
    // continuation token for the next fetch of current_file
    marker: String,
    // bytes of current_file written to the sink so far
    bytes_written: u64,
}

impl Default for DownloadState {
    fn default() -> Self {
        Self {
            watermark: 0,
            current_file: String::new(),
            marker: BEGINNING_MARKER.to_string(),
            bytes_written: 0,
        }
    }
}

impl DownloadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    pub fn current_file(&self) -> &str {
        &self.current_file
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Make `name` the file in progress. Progress for any other file is meaningless for
    /// `name`, so marker and byte count restart together. Returns true if the file changed.
    pub fn switch_to(&mut self, name: &str) -> bool {
        if self.current_file == name {
            return false;
        }
        self.current_file = name.to_string();
        self.marker = BEGINNING_MARKER.to_string();
        self.bytes_written = 0;
        true
    }

    /// Account for a chunk of the current file that reached the sink.
    pub fn record_chunk(&mut self, written: u64) {
        self.bytes_written += written;
    }

    pub fn set_marker(&mut self, marker: String) {
        self.marker = marker;
    }

    /// Move the watermark up to `last_written`. It never goes backwards.
    pub fn advance_watermark(&mut self, last_written: i64) {
        self.watermark = self.watermark.max(last_written);
    }
}

/// JSON checkpoint of a [`DownloadState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. A missing file is a fresh start.
    pub async fn load(&self) -> Result<DownloadState, StateError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DownloadState::new());
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the checkpoint atomically: write a sibling file, then rename over.
    pub async fn save(&self, state: &DownloadState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(state).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}
