// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Background expiry sweep
//!
//! Runs [`InstrumentedCache::sweep`] on a fixed period. Reads already purge
//! expired entries lazily, so the sweeper only reclaims space held by entries
//! nobody asks for.
//!
//! Each pass holds the handle's gate. [`SweeperHandle::stop`] closes the gate,
//! which blocks until a running pass has finished, so once `stop` returns no
//! pass touches the cache again.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::instrumentation::InstrumentedCache;

/// Handle to a running sweeper task
pub struct SweeperHandle {
    /// `true` once stopped
    gate: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn the sweeper on the current tokio runtime.
    /// Returns `None` when called outside a runtime.
    pub fn spawn(cache: InstrumentedCache, period: Duration) -> Option<Self> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available; background sweeper not started");
                return None;
            }
        };

        let gate = Arc::new(Mutex::new(false));
        let task_gate = Arc::clone(&gate);
        let task = runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let cache = cache.clone();
                let gate = Arc::clone(&task_gate);
                let pass = tokio::task::spawn_blocking(move || {
                    let stopped = gate.lock();
                    if *stopped {
                        return None;
                    }
                    Some(cache.sweep())
                });
                match pass.await {
                    Ok(Some(purged)) => debug!("sweeper pass purged {} entries", purged),
                    Ok(None) => break,
                    Err(err) => warn!("sweeper pass did not complete: {}", err),
                }
            }
            debug!("sweeper stopped");
        });

        info!("background sweeper started (every {:?})", period);
        Some(Self { gate, task })
    }

    /// Stop the task, waiting for a pass in progress to finish.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let mut stopped = self.gate.lock();
        if !*stopped {
            *stopped = true;
            self.task.abort();
            debug!("sweeper stop requested");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
