// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for TierCache
//!
//! Opens a cache directory, runs one command against it and shuts it down.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{open_cache, run};
