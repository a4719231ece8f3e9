use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use speedwatch::config::{AppConfig, TestInterval};
use speedwatch::history::DateRange;
use speedwatch::scheduler::{Orchestrator, TestOutcome};
use speedwatch::throughput::report;

#[derive(Parser)]
#[command(
    name = "speedwatch",
    about = "Continuous network throughput and latency monitor",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + orchestrator)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Begin continuous testing immediately
        #[arg(long)]
        start: bool,
    },

    /// Run a single speed test and record it
    SpeedTest {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Test continuously in the foreground until Ctrl-C
    Watch {
        /// Seconds between tests: 1, 5, 10, 30 or 60
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Inspect or clear recorded readings
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Summary statistics over recorded readings
    Stats {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List readings, newest first
    List {
        /// all, today, hour, day, week or month
        #[arg(long, default_value = "all")]
        range: DateRange,

        /// Show at most this many readings
        #[arg(long)]
        limit: Option<usize>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Delete all readings
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;

    speedwatch::init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, start } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting speedwatch daemon");
            speedwatch::serve(&config, start).await?;
        }
        Commands::SpeedTest { json } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            match orchestrator.run_single_test().await {
                TestOutcome::Completed(reading) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&reading)?);
                    } else {
                        println!("{}", report::format_summary(&reading));
                    }
                }
                TestOutcome::Failed(message) => anyhow::bail!("speed test failed: {}", message),
                TestOutcome::AlreadyRunning => anyhow::bail!("a speed test is already running"),
            }
        }
        Commands::Watch { interval } => {
            if let Some(secs) = interval {
                config.settings.interval = TestInterval::try_from(secs)?;
            }
            watch(&config).await?;
        }
        Commands::History { action } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            match action {
                HistoryAction::List { range, limit, json } => {
                    let mut readings = orchestrator.history_in_range(&range).await;
                    if let Some(limit) = limit {
                        readings.truncate(limit);
                    }
                    if json {
                        println!("{}", serde_json::to_string_pretty(&readings)?);
                    } else if readings.is_empty() {
                        println!("No readings found.");
                    } else {
                        for r in &readings {
                            println!("{}", report::format_summary(r));
                        }
                    }
                }
                HistoryAction::Clear => {
                    orchestrator.clear_history().await;
                    println!("History cleared.");
                }
            }
        }
        Commands::Stats { json } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let stats = orchestrator.statistics().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", report::format_statistics(&stats));
            }
        }
    }

    Ok(())
}

/// Foreground continuous mode: print each new reading until Ctrl-C.
async fn watch(config: &AppConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    println!(
        "Testing every {} (Ctrl-C to stop)...",
        config.settings.interval
    );
    let mut last_seen = orchestrator.latest_reading().await.map(|r| r.id);
    orchestrator.start_testing().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                let latest = orchestrator.latest_reading().await;
                if let Some(r) = latest.filter(|r| Some(r.id) != last_seen) {
                    println!("{}", report::format_summary(&r));
                    last_seen = Some(r.id);
                }
            }
        }
    }

    orchestrator.shutdown().await;
    println!("\n{}", report::format_statistics(&orchestrator.statistics().await));
    Ok(())
}
