//! pgBadger invocation against a cycle's assembled log file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("pgbadger not found on PATH: {0}")]
    NotFound(#[from] which::Error),
    #[error("running pgbadger failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("pgbadger exited with {status}")]
    Failed { status: ExitStatus },
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub outdir: PathBuf,
    pub retention_weeks: u32,
    pub anonymize: bool,
    pub start_monday: bool,
    /// Must match `log_line_prefix` in the database's postgresql.conf.
    pub prefix: String,
}

pub struct Analyzer {
    binary: PathBuf,
    settings: AnalysisSettings,
}

impl Analyzer {
    /// Resolve `pgbadger` on PATH.
    pub fn locate(settings: AnalysisSettings) -> Result<Self, AnalysisError> {
        let binary = which::which("pgbadger")?;
        Ok(Self::with_binary(binary, settings))
    }

    pub fn with_binary(binary: impl Into<PathBuf>, settings: AnalysisSettings) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    /// Run an incremental report over `log_path`, waiting for it to finish. Output lines
    /// are forwarded to the log.
    pub async fn run(&self, log_path: &Path) -> Result<(), AnalysisError> {
        tokio::fs::create_dir_all(&self.settings.outdir).await?;
        let outdir = std::path::absolute(&self.settings.outdir)?;
        let args = command_args(&self.settings, &outdir, log_path);
        debug!(binary = %self.binary.display(), ?args, "running pgbadger");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;
        for line in String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .filter(|line| !line.trim().is_empty())
        {
            info!(target: "pgbadger", "{line}");
        }

        if !output.status.success() {
            return Err(AnalysisError::Failed {
                status: output.status,
            });
        }
        Ok(())
    }
}

/// Arguments for an incremental pgBadger run writing into `outdir`.
pub fn command_args(settings: &AnalysisSettings, outdir: &Path, log_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--incremental".into()];
    if settings.anonymize {
        args.push("--anonymize".into());
    }
    if settings.start_monday {
        args.push("--start-monday".into());
    }
    args.push("--prefix".into());
    args.push(settings.prefix.clone().into());
    args.push("--retention".into());
    args.push(settings.retention_weeks.to_string().into());
    args.push("--outdir".into());
    args.push(outdir.into());
    args.push(log_path.into());
    args
}
