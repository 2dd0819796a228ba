use std::path::PathBuf;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{Error, Result, WrapErr};
use flashfly::arb::collaborators::{Clock, SystemClock};
use flashfly::arb::path::path_key;
use flashfly::arb::types::ExchangeIndex;
use flashfly::config::EngineConfig;
use flashfly::notify::SlackNotifier;
use flashfly::sim::Scenario;
use flashfly::utils::logger::setup_logger;
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry-run a scenario against simulated lender and venues
    Demo {
        /// Scenario file (JSON), the bundled one if omitted
        #[arg(long)]
        scenario: Option<PathBuf>,
        /// Forward executed cycles and withdrawals to Slack
        #[arg(long)]
        slack: bool,
    },
    /// Print the key a path would be registered under
    PathKey {
        /// Token addresses, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        tokens: Vec<Address>,
        /// Exchange index per hop, comma separated
        #[arg(long, value_delimiter = ',')]
        hops: Vec<ExchangeIndex>,
    },
}

async fn run_demo(config: EngineConfig, scenario: Option<PathBuf>, slack: bool) -> Result<(), Error> {
    let scenario = match scenario {
        Some(path) => Scenario::from_file(&path)
            .wrap_err_with(|| format!("failed to load scenario {}", path.display()))?,
        None => Scenario::builtin()?,
    };
    let notifier = if slack { Some(SlackNotifier::new()?) } else { None };

    let (engine, _clock) = scenario.build(config, SystemClock.now())?;
    let mut events = engine.subscribe();

    let monitor = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("event: {event}");
            if let Some(notifier) = &notifier {
                if let Err(e) = notifier.notify(&event).await {
                    warn!("Slack notification failed: {e:#}");
                }
            }
        }
    });

    let report = scenario.run(&engine)?;
    // Closing the engine closes the event stream
    drop(engine);
    monitor.await?;

    println!("\n{report}");
    info!(
        "Demo finished: {} of {} attempts executed",
        report.executed(),
        report.attempts.len()
    );
    Ok(())
}

fn print_path_key(tokens: &[Address], hops: &[ExchangeIndex]) {
    if tokens.len() < 2 || hops.len() != tokens.len() - 1 {
        warn!(
            "{} tokens and {} hops would be rejected at registration",
            tokens.len(),
            hops.len()
        );
    }
    println!("{}", path_key(tokens, hops));
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_logger()?;
    let config = EngineConfig::from_env()?;
    info!(
        "Engine config: swap deadline {}s, premium {} bps",
        config.swap_deadline_secs, config.premium_bps
    );

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Demo { scenario, slack }) => run_demo(config, scenario, slack).await?,
        Some(Commands::PathKey { tokens, hops }) => print_path_key(&tokens, &hops),
        None => run_demo(config, None, false).await?,
    }

    Ok(())
}
