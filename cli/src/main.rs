// blecounter: counter exchange CLI
//
// Runs the central/peripheral counter exchange over the in-memory loopback
// radio and manages the shared exchange configuration.

mod config;
mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "blecounter")]
#[command(about = "BLE counter exchange over a loopback radio", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a peripheral and a central against each other
    Demo {
        /// Number of counter increments
        #[arg(short, long, default_value = "10")]
        ticks: u32,
        /// Milliseconds between increments (defaults to tick_interval_ms)
        #[arg(short, long)]
        interval_ms: Option<u64>,
        /// Initial counter value
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        start: i64,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show the configured service and characteristic ids
    Ids,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();
    tracing::debug!(service = %config.service_id, "configuration loaded");

    match cli.command {
        Commands::Demo {
            ticks,
            interval_ms,
            start,
        } => cmd_demo(config, ticks, interval_ms, start).await,
        Commands::Config { action } => cmd_config(config, action),
        Commands::Ids => cmd_ids(&config),
    }
}

async fn cmd_demo(
    config: config::Config,
    ticks: u32,
    interval_ms: Option<u64>,
    start: i64,
) -> Result<()> {
    println!("{}", "BLE Counter Demo".bold());
    println!();

    let options = demo::DemoOptions {
        ticks,
        interval: Duration::from_millis(interval_ms.unwrap_or(config.tick_interval_ms)),
        start,
    };
    let report = demo::run(&config, options).await?;

    println!();
    println!(
        "{} Central received {} values, last {}",
        "✓".green(),
        report.values.len().to_string().bright_cyan(),
        report
            .last_value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(none)".to_string())
            .bright_yellow()
    );

    Ok(())
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }

            println!();
            println!(
                "  {}",
                format!("File: {}", config::Config::config_file()?.display()).dimmed()
            );
        }
    }

    Ok(())
}

fn cmd_ids(config: &config::Config) -> Result<()> {
    println!("{}", "Exchange identifiers".bold());
    println!("  Service:        {}", config.service_id.to_string().bright_cyan());
    println!(
        "  Characteristic: {}",
        config.characteristic_id.to_string().bright_yellow()
    );
    Ok(())
}
