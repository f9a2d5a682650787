//! Fetch loop: drains every listed log file into a sink exactly once.
//!
//! Progress lives in [`DownloadState`] and is updated after every chunk that reaches the
//! sink, so an aborted cycle can be resumed by the next one without refetching or
//! skipping bytes. Whether a file has more data is decided by comparing the bytes written
//! against the size reported at listing time; the source's own "more data pending" flag
//! is known to under-report and is never consulted.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::source::{LogFileDescriptor, LogSource, SourceError};
use crate::state::DownloadState;

/// Appended by RDS when it clips a line inside a portion.
pub const TRUNCATION_SUFFIX: &str = " [Your log message was truncated]\n";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("listing log files failed: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("fetching {file} failed: {source}")]
    Fetch {
        file: String,
        #[source]
        source: SourceError,
    },
    #[error("writing {file} to sink failed: {source}")]
    Sink {
        file: String,
        /// Bytes of this cycle that reached the sink before the failed write.
        committed: u64,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub name: String,
    /// Bytes written during this pass, not the file total.
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub files: Vec<FileSummary>,
}

impl CycleSummary {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

/// List files changed since the watermark and drain each of them into `sink`, in listing
/// order. On error the state is left exactly as after the last chunk written.
pub async fn drain_cycle<S, W>(
    source: &S,
    state: &mut DownloadState,
    sink: &mut W,
) -> Result<CycleSummary, FetchError>
where
    S: LogSource + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let files = source
        .list_files(state.watermark())
        .await
        .map_err(FetchError::SourceUnavailable)?;
    debug!(count = files.len(), since = state.watermark(), "listed log files");

    let mut summary = CycleSummary::default();
    for file in &files {
        if state.switch_to(&file.name) {
            debug!(file = %file.name, "starting new file");
        }
        let bytes = drain_file(source, file, state, sink, summary.total_bytes()).await?;
        // The listing returns the newest file again if it grows after this call, so
        // anchoring on its lastWritten re-examines it next cycle.
        if let Some(last_written) = file.last_written {
            state.advance_watermark(last_written);
        }
        summary.files.push(FileSummary {
            name: file.name.clone(),
            bytes,
        });
    }
    Ok(summary)
}

/// Fetch portions of `file` from `state.marker()` until `file.size` bytes have been
/// written or the source returns no data. Returns the bytes written by this call.
/// `cycle_bytes` is what earlier files of the cycle already wrote to `sink`.
async fn drain_file<S, W>(
    source: &S,
    file: &LogFileDescriptor,
    state: &mut DownloadState,
    sink: &mut W,
    cycle_bytes: u64,
) -> Result<u64, FetchError>
where
    S: LogSource + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let start = state.bytes_written();
    loop {
        let portion = source
            .fetch_portion(&file.name, state.marker())
            .await
            .map_err(|source| FetchError::Fetch {
                file: file.name.clone(),
                source,
            })?;

        let Some(data) = portion.data else {
            break;
        };
        let chunk = strip_truncation(&data);
        // An empty chunk leaves the marker where it was; asking again would loop forever.
        if chunk.is_empty() {
            debug!(file = %file.name, raw = data.len(), "empty portion, stopping");
            break;
        }
        let committed = cycle_bytes + state.bytes_written() - start;
        sink.write_all(chunk.as_bytes())
            .await
            .map_err(|source| FetchError::Sink {
                file: file.name.clone(),
                committed,
                source,
            })?;
        state.record_chunk(chunk.len() as u64);
        debug!(
            file = %file.name,
            chunk = chunk.len(),
            written = state.bytes_written(),
            size = file.size,
            pending = portion.additional_data_pending,
            "wrote portion"
        );

        let marker = next_marker(
            portion.marker.as_deref().unwrap_or(state.marker()),
            state.bytes_written(),
        );
        state.set_marker(marker);

        if state.bytes_written() >= file.size {
            break;
        }
    }

    let bytes = state.bytes_written() - start;
    info!(file = %file.name, bytes, "downloaded file");
    Ok(bytes)
}

/// Remove the fixed truncation suffix if the chunk ends with it.
pub fn strip_truncation(data: &str) -> &str {
    data.strip_suffix(TRUNCATION_SUFFIX).unwrap_or(data)
}

/// Keep the part of the server marker before `:` and point it at `offset`.
pub fn next_marker(server_marker: &str, offset: u64) -> String {
    let prefix = server_marker
        .split_once(':')
        .map_or(server_marker, |(prefix, _)| prefix);
    format!("{prefix}:{offset}")
}
