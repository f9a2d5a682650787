use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::AnalysisSettings;
use crate::rds::AwsSettings;

/// Immutable configuration used by the application runtime
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: String,
    pub download_interval: Duration,
    pub aws: AwsSettings,
    pub instance: String,
    pub analysis: AnalysisSettings,
    pub state_file: Option<PathBuf>,
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(
    name = "pgdrain",
    version,
    about = "Incrementally downloads RDS PostgreSQL logs and publishes pgBadger reports"
)]
struct Args {
    /// Address to listen on for the HTTP server
    #[arg(long = "listen-address", default_value = "0.0.0.0:8080")]
    listen_address: String,

    /// How often to query for new log files (e.g. 30s, 15m, 1h)
    #[arg(long = "download-interval", default_value = "15m", value_parser = parse_duration)]
    download_interval: Duration,

    /// AWS access key; the default credential chain is used when unset
    #[arg(long = "aws-access-key", env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_access_key: Option<String>,

    /// AWS secret key
    #[arg(long = "aws-secret-key", env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_key: Option<String>,

    /// AWS region of the instance
    #[arg(long = "aws-region", env = "AWS_REGION", default_value = "us-east-1")]
    aws_region: String,

    /// RDS instance identifier
    #[arg(long = "instance")]
    instance: String,

    /// pgBadger output directory, also served over HTTP
    #[arg(long = "pgb-outdir", default_value = "outdir")]
    pgb_outdir: PathBuf,

    /// Number of weeks to keep reports
    #[arg(long = "pgb-retention", default_value_t = 4)]
    pgb_retention: u32,

    /// log_line_prefix as defined in your postgresql.conf
    #[arg(long = "pgb-prefix", default_value = "%t:%r:%u@%d:[%p]:")]
    pgb_prefix: String,

    /// Keep queries as-is in reports instead of anonymizing them
    #[arg(long = "pgb-no-anonymize")]
    pgb_no_anonymize: bool,

    /// Start weeks on Sunday instead of Monday
    #[arg(long = "pgb-no-start-monday")]
    pgb_no_start_monday: bool,

    /// Persist download progress here so restarts resume instead of re-listing
    #[arg(long = "state-file", value_name = "PATH")]
    state_file: Option<PathBuf>,
}

/// Parse `<n>ms`, `<n>s`, `<n>m` or `<n>h`.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let re = Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)\s*$").map_err(|e| e.to_string())?;
    let caps = re
        .captures(raw)
        .ok_or_else(|| format!("invalid duration {raw:?}, expected e.g. 30s, 15m or 1h"))?;
    let n: u64 = caps[1].parse().map_err(|e| format!("{e}"))?;
    let duration = match &caps[2] {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        _ => Duration::from_secs(n * 3600),
    };
    if duration.is_zero() {
        return Err("interval must be greater than zero".into());
    }
    Ok(duration)
}

/// Parse CLI options into an application Config
pub fn parse() -> Config {
    from_args(Args::parse())
}

fn from_args(args: Args) -> Config {
    Config {
        listen_address: args.listen_address,
        download_interval: args.download_interval,
        aws: AwsSettings {
            access_key: args.aws_access_key.filter(|k| !k.is_empty()),
            secret_key: args.aws_secret_key.filter(|k| !k.is_empty()),
            region: args.aws_region,
        },
        instance: args.instance,
        analysis: AnalysisSettings {
            outdir: args.pgb_outdir,
            retention_weeks: args.pgb_retention,
            anonymize: !args.pgb_no_anonymize,
            start_monday: !args.pgb_no_start_monday,
            prefix: args.pgb_prefix,
        },
        state_file: args.state_file,
    }
}
