// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tiercache")]
#[command(about = "Two-tier key/value cache with TTL expiry and tag revalidation")]
#[command(version)]
pub struct Cli {
    /// Cache directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub path: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Compress values written to disk
    #[arg(long, global = true)]
    pub compress: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Store a value
    Set {
        key: String,
        value: String,

        /// Time to live in milliseconds (defaults to the configured TTL)
        #[arg(long)]
        ttl_ms: Option<u64>,

        /// Tag to attach; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Value type recorded with the payload
        #[arg(long = "type", default_value = "text/plain")]
        value_type: String,
    },

    /// Remove a key from both tiers
    Delete { key: String },

    /// Invalidate every key carrying a tag
    Revalidate { tag: String },

    /// Purge expired entries
    Sweep,

    /// Show cache statistics
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
