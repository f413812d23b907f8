//! Command-line parsing for the `yq` bond-yield and market-quote tool.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! resolution and formatting.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ChartRange;
use crate::logging::LogFormat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "yq", version, about = "Korean bond yields and market quotes from tiered sources")]
pub struct Cli {
    /// TOML config file (defaults are used when omitted).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `kr_yields::resolver=debug`. Overrides the config file.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log line format. Overrides the config file.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the configured government bonds through the source chain.
    Bonds(BondsArgs),
    /// Download market quote groups (indices, FX, commodities).
    Quotes(QuotesArgs),
    /// Bonds plus market quotes; the default when no command is given.
    Dashboard(DashboardArgs),
    /// Show the source chain order and which credentials are configured.
    Sources,
}

#[derive(Debug, Args, Clone)]
pub struct BondsArgs {
    /// Only these instrument keys (comma-separated, e.g. `KR10Y`). Any failure exits with code 3.
    #[arg(long, value_delimiter = ',', value_name = "KEY")]
    pub only: Vec<String>,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct QuotesArgs {
    /// Chart window.
    #[arg(long, value_enum, default_value_t = ChartRange::FiveDays)]
    pub range: ChartRange,

    /// Only this group (e.g. `forex`).
    #[arg(long)]
    pub group: Option<String>,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DashboardArgs {
    /// Chart window for market quotes.
    #[arg(long, value_enum, default_value_t = ChartRange::FiveDays)]
    pub range: ChartRange,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Refresh every SECS seconds until interrupted.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub watch: Option<u64>,
}
