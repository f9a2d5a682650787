//! pgdrain entry point: parses CLI, sets up logging and starts the async cycle loop.
//! The main function is intentionally thin and delegates to the runtime in `app`.

mod analysis;
mod app;
mod cli;
mod fetch;
mod publish;
mod rds;
mod source;
mod state;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!("warn,pgdrain={log_level},pgbadger={log_level},tower_http={log_level}");
    let env_filter = EnvFilter::try_new(filter_string)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config = cli::parse();
    app::run(config).await
}
