// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for TierCache

use colored::Colorize;
use std::time::Duration;

use super::commands::{Cli, Commands, OutputFormat};
use super::output::StatsFormatter;
use tiercache::{CacheConfig, CacheManager, CachedValue};

/// Build the cache for one invocation.
///
/// Settings come from `--config` when given, then `--path` and `--compress`
/// override it. The background sweeper stays off for a one-shot process.
pub fn open_cache(cli: &Cli) -> Result<CacheManager, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(file) => CacheConfig::from_json_file(file)?,
        None => CacheConfig::default(),
    };
    if let Some(path) = &cli.path {
        config.cache_directory_path = path.clone();
    }
    if cli.compress {
        config = config.with_compression(true);
    }
    let config = config.with_sweep_interval_secs(0);

    log::debug!("opening cache at {}", config.cache_directory_path.display());
    let cache =
        CacheManager::new(config).map_err(|e| format!("Failed to open cache: {}", e))?;
    Ok(cache)
}

/// Run one command against an open cache
pub fn run(cache: &CacheManager, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Get { key, format } => handle_get(cache, &key, format),
        Commands::Set {
            key,
            value,
            ttl_ms,
            tags,
            value_type,
        } => handle_set(cache, &key, value, ttl_ms, tags, value_type),
        Commands::Delete { key } => {
            if cache.delete(&key) {
                println!("{}", format!("Deleted '{}'", key).green());
            } else {
                println!("{}", format!("No entry for '{}'", key).yellow());
            }
            Ok(())
        }
        Commands::Revalidate { tag } => handle_revalidate(cache, &tag),
        Commands::Sweep => {
            let purged = cache.sweep();
            println!("{}", format!("Purged {} expired entries", purged).green());
            Ok(())
        }
        Commands::Stats { format } => {
            println!("{}", StatsFormatter::format(cache, format)?);
            Ok(())
        }
        // Handled before the cache is opened
        Commands::Version => Ok(()),
    }
}

fn handle_get(
    cache: &CacheManager,
    key: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match (cache.get(key), format) {
        (Some(value), OutputFormat::Table) => {
            println!("{} {}", "type:".bold(), value.value_type);
            println!("{}", value.as_text());
        }
        (Some(value), OutputFormat::Json) => {
            let json = serde_json::json!({
                "status": "hit",
                "key": key,
                "value_type": value.value_type,
                "value": value.as_text(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        (None, OutputFormat::Table) => println!("{}", "miss".yellow()),
        (None, OutputFormat::Json) => {
            let json = serde_json::json!({ "status": "miss", "key": key });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn handle_set(
    cache: &CacheManager,
    key: &str,
    value: String,
    ttl_ms: Option<u64>,
    tags: Vec<String>,
    value_type: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let ttl = ttl_ms.map(Duration::from_millis);
    let value = CachedValue::new(value_type, value);

    if cache.set_with_tags(key, value, ttl, tags) {
        println!("{}", format!("Stored '{}'", key).green());
        Ok(())
    } else {
        println!("{}", format!("Write for '{}' was rejected", key).red());
        Err("write rejected".into())
    }
}

fn handle_revalidate(cache: &CacheManager, tag: &str) -> Result<(), Box<dyn std::error::Error>> {
    let before = cache.stats().invalidated_keys;
    if !cache.revalidate_tag(tag) {
        println!("{}", format!("Revalidation of '{}' failed", tag).red());
        return Err("revalidation failed".into());
    }
    let invalidated = cache.stats().invalidated_keys - before;
    println!(
        "{}",
        format!("Revalidated '{}': {} entries invalidated", tag, invalidated).green()
    );
    Ok(())
}
