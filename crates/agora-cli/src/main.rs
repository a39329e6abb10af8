//! Agora CLI.
//!
//! Operator tooling for the marketplace engine: a scripted end-to-end demo
//! against the in-memory ledger, and a settlement-split calculator.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Agora: multi-modal marketplace engine for semi-fungible tokens.
#[derive(Parser)]
#[command(name = "agora")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted multi-mode scenario on the in-memory ledger
    Demo {
        /// Output format (json, human)
        #[arg(short, long, default_value = "human")]
        format: String,

        /// Seed for the raffle winner source
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Append emitted events to this JSONL file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// Inspect or validate the platform fee
    Fee {
        #[command(subcommand)]
        action: FeeCommands,
    },

    /// Compute the settlement split for one gross value
    Split {
        /// Gross value in smallest currency units
        #[arg(long)]
        gross: u128,

        /// Platform fee snapshot in basis points
        #[arg(long, default_value_t = 250)]
        fee_bps: u16,

        /// Royalty rate in basis points (0 = no royalty)
        #[arg(long, default_value_t = 0)]
        royalty_bps: u16,

        /// Royalty receiver is the seller (skips the royalty step)
        #[arg(long, default_value_t = false)]
        royalty_to_seller: bool,
    },
}

#[derive(Subcommand)]
enum FeeCommands {
    /// Show the fee rate resolved from the environment
    Get,

    /// Validate a new fee rate against the owner cap
    Set {
        /// New fee in basis points
        #[arg(long)]
        bps: u16,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            format,
            seed,
            event_log,
        } => commands::demo::run(&format, seed, event_log),
        Commands::Fee { action } => match action {
            FeeCommands::Get => commands::fee::get(),
            FeeCommands::Set { bps } => commands::fee::set(bps),
        },
        Commands::Split {
            gross,
            fee_bps,
            royalty_bps,
            royalty_to_seller,
        } => commands::split::run(gross, fee_bps, royalty_bps, royalty_to_seller),
    }
}
