use std::path::Path;

use anyhow::Result;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::analysis::{AnalysisError, Analyzer};
use crate::cli::Config;
use crate::fetch::{FetchError, drain_cycle};
use crate::publish;
use crate::rds::RdsLogSource;
use crate::source::LogSource;
use crate::state::{DownloadState, StateStore};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to create temp file: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("failed to download logs: {0}")]
    Fetch(#[from] FetchError),
    #[error("failed to run pgbadger: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Application runtime: wires the log source, publisher and cycle loop.
pub async fn run(config: Config) -> Result<()> {
    let store = config.state_file.clone().map(StateStore::new);
    let mut state = match &store {
        Some(store) => {
            let state = store.load().await?;
            info!(path = %store.path().display(), ?state, "loaded download state");
            state
        }
        None => DownloadState::new(),
    };

    let analyzer = Analyzer::locate(config.analysis.clone())?;
    let source = RdsLogSource::connect(&config.aws, config.instance.clone()).await;
    publish::spawn(
        config.listen_address.clone(),
        config.analysis.outdir.clone(),
    );

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        // The timer is only rearmed once the cycle is over, so cycles never overlap.
        if let Err(e) = run_cycle(&source, &analyzer, &mut state, store.as_ref()).await {
            error!("{e}");
        }
        tokio::select! {
            _ = tokio::time::sleep(config.download_interval) => {}
            _ = &mut shutdown => {
                info!("received ctrl-c, shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// One cycle: drain new log data into a fresh temp file, then report on it. The temp
/// file is removed when this returns, whatever the outcome.
pub async fn run_cycle<S>(
    source: &S,
    analyzer: &Analyzer,
    state: &mut DownloadState,
    store: Option<&StateStore>,
) -> Result<(), CycleError>
where
    S: LogSource + ?Sized,
{
    info!(
        watermark = state.watermark(),
        file = state.current_file(),
        marker = state.marker(),
        bytes = state.bytes_written(),
        "starting download"
    );

    let temp = tempfile::Builder::new()
        .prefix("pgdrain")
        .tempfile()
        .map_err(CycleError::TempFile)?;
    info!(path = %temp.path().display(), "created temp file");
    let handle = temp.as_file().try_clone().map_err(CycleError::TempFile)?;
    let mut sink = tokio::fs::File::from_std(handle);

    let drained = drain_cycle(source, state, &mut sink).await;
    let flushed = sink.flush().await;
    // The temp file is the only copy of what the state now counts as downloaded, so a
    // failed checkpoint must not keep it from being reported.
    if let Some(store) = store {
        if let Err(e) = store.save(state).await {
            error!("failed to save download state: {e}");
        }
    }

    match drained {
        Ok(summary) => {
            flushed.map_err(CycleError::TempFile)?;
            if summary.total_bytes() == 0 {
                info!("no new log data");
                return Ok(());
            }
            let files: Vec<&str> = summary.files.iter().map(|f| f.name.as_str()).collect();
            info!(?files, bytes = summary.total_bytes(), "download finished");
            analyze(analyzer, temp.path()).await
        }
        // Chunks that reached the sink are already accounted for in the state and will
        // not be fetched again, so report on them before giving up.
        Err(e) => {
            let partial = salvage(&e, &mut sink, flushed.is_ok()).await;
            if partial > 0 {
                warn!(bytes = partial, "download interrupted, reporting on partial data");
                if let Err(analysis) = analyze(analyzer, temp.path()).await {
                    error!("{analysis}");
                }
            }
            Err(e.into())
        }
    }
}

/// Bytes of an aborted cycle that can still be reported. After a failed write the sink
/// is cut back to the chunks the state has counted.
async fn salvage(err: &FetchError, sink: &mut tokio::fs::File, flushed: bool) -> u64 {
    match err {
        FetchError::SourceUnavailable(_) => 0,
        FetchError::Fetch { .. } if flushed => {
            sink.metadata().await.map(|m| m.len()).unwrap_or(0)
        }
        FetchError::Fetch { .. } => 0,
        FetchError::Sink { committed, .. } => match sink.set_len(*committed).await {
            Ok(()) => *committed,
            Err(e) => {
                error!("failed to trim temp file after write error: {e}");
                0
            }
        },
    }
}

async fn analyze(analyzer: &Analyzer, path: &Path) -> Result<(), CycleError> {
    analyzer.run(path).await?;
    info!("report updated");
    Ok(())
}
