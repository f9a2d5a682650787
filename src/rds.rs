//! RDS-backed log source (DescribeDBLogFiles / DownloadDBLogFilePortion).

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_rds::Client;
use aws_sdk_rds::error::DisplayErrorContext;
use tracing::debug;

use crate::source::{LogFileDescriptor, LogPortion, LogSource, SourceError};

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
}

pub struct RdsLogSource {
    client: Client,
    instance: String,
}

impl RdsLogSource {
    /// Build a client for `instance`. Static keys are used when both are given, otherwise
    /// the default provider chain (env, profile, instance metadata) resolves credentials.
    pub async fn connect(settings: &AwsSettings, instance: impl Into<String>) -> Self {
        let region = Region::new(settings.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "pgdrain");
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
            instance: instance.into(),
        }
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> SourceError
where
    E: std::error::Error,
{
    SourceError::new(operation, DisplayErrorContext(err).to_string())
}

#[async_trait::async_trait]
impl LogSource for RdsLogSource {
    async fn list_files(&self, since: i64) -> Result<Vec<LogFileDescriptor>, SourceError> {
        let output = self
            .client
            .describe_db_log_files()
            .db_instance_identifier(&self.instance)
            .file_last_written(since)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeDBLogFiles", e))?;

        let files = output
            .describe_db_log_files()
            .iter()
            .filter_map(|details| {
                let Some(name) = details.log_file_name() else {
                    debug!("skipping log file entry without a name");
                    return None;
                };
                Some(LogFileDescriptor {
                    name: name.to_string(),
                    size: details.size().unwrap_or(0).max(0) as u64,
                    last_written: details.last_written(),
                })
            })
            .collect();
        Ok(files)
    }

    async fn fetch_portion(&self, file: &str, marker: &str) -> Result<LogPortion, SourceError> {
        let output = self
            .client
            .download_db_log_file_portion()
            .db_instance_identifier(&self.instance)
            .log_file_name(file)
            .marker(marker)
            .send()
            .await
            .map_err(|e| sdk_error("DownloadDBLogFilePortion", e))?;

        Ok(LogPortion {
            data: output.log_file_data().map(str::to_string),
            marker: output.marker().map(str::to_string),
            additional_data_pending: output.additional_data_pending().unwrap_or(false),
        })
    }
}
