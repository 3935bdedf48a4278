/// # pleiades-reporter CLI Interface (Module)
///
/// This module implements the CLI for pleiades-reporter: argument parsing,
/// subcommand routing and the interactive report/publish loop.
///
/// All reporter, channel and scheduling logic lives in the
/// [`pleiades-reporter-core`] crate. This module is CLI glue only.
///
/// ## Subcommands
/// - `run`: check reporters on schedule, prompt the operator for each batch
///   of new reports, and release queued posts on schedule
/// - `check`: one forced round of every reporter, printed and discarded
///
/// [`pleiades-reporter-core`]: ../../pleiades-reporter-core/
use crate::assemble::build_looper;
use crate::interactive::{print_listing, prompt_until_done};
use crate::load_config::{load_config, CliConfig};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pleiades_reporter_core::commands::Disposition;
use pleiades_reporter_core::looper::Looper;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;

/// CLI for pleiades-reporter: report Pleiades and Zotero changes to the Fediverse.
#[derive(Parser)]
#[clap(
    name = "pleiades-reporter",
    version,
    about = "Watch Pleiades feeds and the Pleiades Zotero library, and post selected reports to GoToSocial/Mastodon"
)]
pub struct Cli {
    /// Log level: DEBUG, INFO, WARNING or ERROR
    #[clap(short = 'l', long, global = true)]
    pub loglevel: Option<String>,

    /// Log at INFO level
    #[clap(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Log at DEBUG level
    #[clap(short = 'w', long, global = true)]
    pub veryverbose: bool,

    /// User-Agent header for web requests (overrides the config file)
    #[clap(short = 'u', long, global = true)]
    pub useragent: Option<String>,

    /// From header (operator email) for web requests (overrides the config file)
    #[clap(short = 'f', long, global = true)]
    pub from: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the interactive report and publish loop
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Check every reporter once and print what is new
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

fn apply_overrides(mut config: CliConfig, useragent: Option<String>, from: Option<String>) -> CliConfig {
    if let Some(ua) = useragent {
        tracing::info!(user_agent = %ua, "User-Agent overridden on the command line");
        config.user_agent = ua;
    }
    if let Some(from) = from {
        tracing::info!(from = %from, "From header overridden on the command line");
        config.from = from;
    }
    config
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config } => {
            let config = apply_overrides(load_config(config)?, cli.useragent, cli.from);
            tracing::info!(command = "run", "Starting report loop");
            run_loop(&config).await
        }
        Commands::Check { config } => {
            let config = apply_overrides(load_config(config)?, cli.useragent, cli.from);
            tracing::info!(command = "check", "Checking all reporters once");
            check_once(&config).await
        }
    }
}

async fn check_once(config: &CliConfig) -> Result<()> {
    let mut looper = build_looper(config, false)?;
    let reports = looper.check_reporters(Utc::now(), true).await;
    let mut stdout = std::io::stdout();
    if reports.is_empty() {
        writeln!(stdout, "No new reports.")?;
    } else {
        print_listing(&mut stdout, &reports)?;
    }
    tracing::info!(command = "check", count = reports.len(), "Check complete");
    Ok(())
}

async fn run_loop(config: &CliConfig) -> Result<()> {
    let mut looper = build_looper(config, true)?;
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let loop_period = Duration::from_secs(config.loop_period);
    run_rounds(
        &mut looper,
        &mut stdin,
        &mut stdout,
        loop_period,
        interrupt_signal(),
    )
    .await
}

/// Flips to `true` on the first Ctrl-C. One listener serves the whole run.
pub fn interrupt_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to listen for Ctrl-C");
                // Holding `tx` keeps `wait_for` pending.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// Check, prompt, publish and sleep until the operator quits or `interrupted`
/// turns `true`. An interrupt is honoured at any point in a round.
pub async fn run_rounds<R, W>(
    looper: &mut Looper,
    input: &mut R,
    output: &mut W,
    loop_period: Duration,
    mut interrupted: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let reports = tokio::select! {
            reports = looper.check_reporters(Utc::now(), false) => reports,
            _ = interrupted.wait_for(|stop| *stop) => break,
        };
        if !reports.is_empty() {
            print_listing(output, &reports)?;
            let disposition = tokio::select! {
                disposition = prompt_until_done(input, output, &reports, looper) => disposition?,
                _ = interrupted.wait_for(|stop| *stop) => break,
            };
            if disposition == Disposition::Quit {
                tracing::info!(command = "run", "Operator quit");
                return Ok(());
            }
        }

        let published = tokio::select! {
            published = looper.post_from_channels(Utc::now()) => published,
            _ = interrupted.wait_for(|stop| *stop) => break,
        };
        if published > 0 {
            tracing::info!(command = "run", published, "Released posts from channel queues");
        }

        tracing::debug!(seconds = loop_period.as_secs(), "Sleeping until next round");
        tokio::select! {
            _ = tokio::time::sleep(loop_period) => {}
            _ = interrupted.wait_for(|stop| *stop) => break,
        }
    }
    tracing::info!(command = "run", "Interrupted");
    Ok(())
}
