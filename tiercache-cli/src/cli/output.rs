// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Statistics formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use tiercache::CacheManager;

use super::commands::OutputFormat;

/// Formats cache state for the `stats` command
pub struct StatsFormatter;

impl StatsFormatter {
    pub fn format(
        cache: &CacheManager,
        format: OutputFormat,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let rows = Self::collect(cache)?;
        Ok(match format {
            OutputFormat::Table => Self::format_table(&rows),
            OutputFormat::Json => Self::format_json(&rows),
        })
    }

    /// Name/value pairs describing the cache on disk and this process's counters
    fn collect(cache: &CacheManager) -> Result<Vec<(&'static str, String)>, Box<dyn std::error::Error>> {
        let config = cache.config();
        let store = cache.store();
        let stats = cache.stats();

        Ok(vec![
            ("path", config.cache_directory_path.display().to_string()),
            ("backend", config.storage_type.to_string()),
            ("compression", config.compress.to_string()),
            ("persisted_records", store.persistent().len()?.to_string()),
            ("tags", store.index().tag_count().to_string()),
            ("tagged_keys", store.index().tagged_key_count().to_string()),
            ("memory_budget_bytes", config.max_memory_bytes.to_string()),
            ("resident_bytes", stats.resident_bytes.to_string()),
            ("resident_entries", stats.resident_entries.to_string()),
            ("default_ttl_secs", config.default_revalidate_seconds.to_string()),
        ])
    }

    fn format_table(rows: &[(&'static str, String)]) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Cache Statistics".bold().green()));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            Cell::new("metric").fg(Color::Green),
            Cell::new("value").fg(Color::Green),
        ]);
        for (name, value) in rows {
            table.add_row(vec![name.to_string(), value.clone()]);
        }

        output.push_str(&table.to_string());
        output
    }

    fn format_json(rows: &[(&'static str, String)]) -> String {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(name, value)| (name.to_string(), serde_json::Value::String(value.clone())))
            .collect();

        serde_json::to_string_pretty(&serde_json::Value::Object(map)).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize stats to JSON\"}".to_string()
        })
    }
}
