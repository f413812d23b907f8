//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads configuration and installs logging
//! - resolves bonds and downloads market quotes
//! - prints text or JSON reports

use std::thread;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{BondsArgs, Cli, Command, DashboardArgs, QuotesArgs};
use crate::config::AppConfig;
use crate::error::{AppError, EXIT_UNRESOLVED};
use crate::logging::{LogConfig, init_logging};
use crate::market::fetch_market_groups;

pub mod pipeline;

use pipeline::{BondStatus, Services};

const SUBCOMMANDS: &[&str] = &["bonds", "quotes", "dashboard", "sources", "help"];

/// Entry point for the `yq` binary.
pub fn run() -> Result<(), AppError> {
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);

    let config = AppConfig::load(cli.config.as_deref())?;
    let log = LogConfig::new(
        cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone()),
        cli.log_format.unwrap_or(config.logging.format),
    );
    init_logging(&log)?;
    debug!(order = ?config.resolver.order, bonds = config.bonds.len(), groups = config.groups.len(), "configuration loaded");

    match cli.command {
        Command::Bonds(args) => handle_bonds(&config, args),
        Command::Quotes(args) => handle_quotes(&config, args),
        Command::Dashboard(args) => handle_dashboard(&config, args),
        Command::Sources => handle_sources(&config),
    }
}

fn handle_bonds(config: &AppConfig, args: BondsArgs) -> Result<(), AppError> {
    let services = Services::from_config(config)?;
    let specs = services.select_bonds(&args.only)?;
    let cards = pipeline::resolve_bonds(&services.resolver, &specs);

    if args.json {
        println!("{}", to_json(&cards)?);
    } else {
        print!("{}", crate::report::format_bonds(&cards));
    }

    // Explicitly requested instruments must resolve; the default listing only reports.
    if !args.only.is_empty() {
        let failed: Vec<&str> = cards
            .iter()
            .filter(|card| matches!(card.status, BondStatus::Unavailable { .. }))
            .map(|card| card.key.as_str())
            .collect();
        if !failed.is_empty() {
            return Err(AppError::new(
                EXIT_UNRESOLVED,
                format!("Could not resolve: {}", failed.join(", ")),
            ));
        }
    }
    Ok(())
}

fn handle_quotes(config: &AppConfig, args: QuotesArgs) -> Result<(), AppError> {
    let services = Services::from_config(config)?;
    let groups = services.select_groups(args.group.as_deref())?;
    let markets = fetch_market_groups(services.series.as_ref(), &groups, args.range);

    if args.json {
        println!("{}", to_json(&markets)?);
    } else {
        print!("{}", crate::report::format_market_groups(&markets));
    }
    Ok(())
}

fn handle_dashboard(config: &AppConfig, args: DashboardArgs) -> Result<(), AppError> {
    let services = Services::from_config(config)?;

    loop {
        let snapshot = pipeline::run_snapshot(&services, args.range);
        if args.json {
            // One document per line in watch mode.
            println!("{}", serde_json::to_string(&snapshot).map_err(json_error)?);
        } else {
            println!("{}", crate::report::format_snapshot(&snapshot));
        }

        let Some(secs) = args.watch else {
            return Ok(());
        };
        info!(secs, "next refresh scheduled");
        thread::sleep(Duration::from_secs(secs));
    }
}

fn handle_sources(config: &AppConfig) -> Result<(), AppError> {
    let services = Services::from_config(config)?;
    print!("{}", crate::report::format_sources(&services.sources(), config));
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(json_error)
}

fn json_error(err: serde_json::Error) -> AppError {
    AppError::data(format!("Failed to serialize JSON: {err}"))
}

/// Rewrite argv so `yq` defaults to `yq dashboard`.
///
/// Rules:
/// - `yq`                          -> `yq dashboard`
/// - `yq --range 1mo ...`          -> `yq dashboard --range 1mo ...`
/// - `yq --config x.toml bonds`    -> unchanged (a subcommand is present)
/// - `yq --help/--version/-h`      -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("dashboard".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version");
    if is_top_level_help_or_version {
        return argv;
    }

    let has_subcommand = argv[1..].iter().any(|arg| SUBCOMMANDS.contains(&arg.as_str()));
    if has_subcommand {
        return argv;
    }

    argv.insert(1, "dashboard".to_string());
    argv
}
