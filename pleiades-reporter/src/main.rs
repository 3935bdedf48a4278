use anyhow::Result;
use clap::Parser;
use pleiades_reporter::cli::{run, Cli};
use pleiades_reporter::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let level = logging::level_from_flags(cli.loglevel.as_deref(), cli.verbose, cli.veryverbose)?;
    logging::init(level);
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
