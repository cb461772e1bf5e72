// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! TierCache CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments first to get log level
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // Still overridable through RUST_LOG
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Commands::Version = cli.command {
        println!("{} {}", "TierCache".bold().green(), tiercache::VERSION);
        println!("Two-tier key/value cache");
        return Ok(());
    }

    let cache = cli::open_cache(&cli)?;
    let result = cli::run(&cache, cli.command);

    // Flush and close the store even when the command failed
    if let Err(e) = cache.shutdown() {
        eprintln!("{}", format!("Shutdown error: {}", e).red());
    }
    result
}
