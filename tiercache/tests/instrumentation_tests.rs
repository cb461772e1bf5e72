// Copyright (c) 2024-2025 TierCache Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Operation metrics, slow-operation reporting, the background sweeper and
//! shutdown

#[path = "testutils/mod.rs"]
mod testutils;

use std::time::Duration;
use testutils::{drain, text, CacheFixture};
use tiercache::{CacheConfig, CacheEvent, CacheManager, Operation, Outcome};

#[test]
fn test_every_operation_emits_a_metric() {
    let fixture = CacheFixture::new();
    let cache = &fixture.cache;
    let mut events = cache.subscribe();

    cache.get("k");
    cache.set_with_tags("k", text("v"), None, ["g"]);
    cache.get("k");
    cache.revalidate_tag("g");

    let metrics: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            CacheEvent::Operation(metric) => Some((metric.operation, metric.target, metric.outcome)),
            _ => None,
        })
        .collect();

    assert_eq!(
        metrics,
        vec![
            (Operation::Get, "k".to_string(), Outcome::Miss),
            (Operation::Set, "k".to_string(), Outcome::Ok),
            (Operation::Get, "k".to_string(), Outcome::Hit),
            (Operation::RevalidateTag, "g".to_string(), Outcome::Ok),
        ]
    );
}

#[test]
fn test_slow_operations_are_reported_without_changing_results() {
    let fixture = CacheFixture::with_config(|config| config.with_slow_operation_threshold_ms(0));
    let cache = &fixture.cache;
    let mut events = cache.subscribe();

    // A durable write with a flush always takes longer than zero
    assert!(cache.set("k", text("v"), None));
    assert_eq!(cache.get("k"), Some(text("v")));

    let slow: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            CacheEvent::SlowOperation {
                metric,
                threshold_ms,
            } => Some((metric.operation, threshold_ms)),
            _ => None,
        })
        .collect();

    assert!(slow.contains(&(Operation::Set, 0)));
    assert!(cache.stats().slow_operations >= 1);
}

#[test]
fn test_fast_operations_are_not_reported_as_slow() {
    let config = CacheConfig::in_memory().with_slow_operation_threshold_ms(60_000);
    let cache = CacheManager::new(config).unwrap();
    let mut events = cache.subscribe();

    assert!(cache.set("k", text("v"), None));
    cache.get("k");

    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, CacheEvent::SlowOperation { .. })));
    assert_eq!(cache.stats().slow_operations, 0);
}

#[test]
fn test_rejected_write_reports_fault_event() {
    let config = CacheConfig::in_memory().with_max_memory_bytes(512);
    let cache = CacheManager::new(config).unwrap();
    let mut events = cache.subscribe();

    assert!(!cache.set("big", text(&"x".repeat(2048)), None));

    let events = drain(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        CacheEvent::Fault { kind, .. } if kind == "capacity_exceeded"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        CacheEvent::Operation(metric) if metric.outcome == Outcome::Rejected
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_purges_unread_entries() {
    let fixture = CacheFixture::with_config(|config| config.with_sweep_interval_secs(1));
    let cache = &fixture.cache;

    assert!(cache.set("short", text("v"), Some(Duration::from_millis(50))));
    assert!(cache.set("long", text("v"), None));
    assert!(cache.spawn_sweeper());
    assert!(!cache.spawn_sweeper());

    tokio::time::sleep(Duration::from_millis(1600)).await;

    assert!(!cache.is_resident("short"));
    assert!(!cache.store().persistent().contains("short").unwrap());
    assert!(cache.store().persistent().contains("long").unwrap());
    assert_eq!(cache.stats().expirations, 1);

    // Shutdown waits for the sweeper and releases the directory
    cache.shutdown().unwrap();
    let reopened = CacheManager::new(cache.config().clone()).unwrap();
    assert_eq!(reopened.get("long"), Some(text("v")));
    reopened.shutdown().unwrap();
}

#[test]
fn test_manual_sweep() {
    let fixture = CacheFixture::new();
    assert!(fixture
        .cache
        .set("a", text("v"), Some(Duration::from_millis(20))));
    assert!(fixture
        .cache
        .set("b", text("v"), Some(Duration::from_millis(20))));
    assert!(fixture.cache.set("c", text("v"), None));
    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(fixture.cache.sweep(), 2);
    assert_eq!(fixture.cache.sweep(), 0);
    assert_eq!(fixture.cache.get("c"), Some(text("v")));
}

#[test]
fn test_shutdown_is_idempotent_and_persists() {
    let fixture = CacheFixture::new();
    assert!(fixture.cache.set("k", text("v"), None));

    fixture.cache.shutdown().unwrap();
    fixture.cache.shutdown().unwrap();
    assert!(fixture.cache.is_shut_down());
    assert_eq!(fixture.cache.get("k"), None);
    assert!(!fixture.cache.set("k", text("w"), None));

    let fixture = fixture.reopen();
    assert_eq!(fixture.cache.get("k"), Some(text("v")));
}

#[test]
fn test_shutdown_releases_directory_while_cache_is_alive() {
    let fixture = CacheFixture::new();
    assert!(fixture.cache.set_with_tags("k", text("v"), None, ["g"]));
    fixture.cache.shutdown().unwrap();
    assert!(fixture.cache.store().persistent().is_closed());

    // `fixture.cache` has not been dropped
    let reopened = CacheManager::new(fixture.cache.config().clone()).unwrap();
    assert_eq!(reopened.get("k"), Some(text("v")));
    assert!(reopened.revalidate_tag("g"));
    assert_eq!(reopened.get("k"), None);

    assert_eq!(fixture.cache.get("k"), None);
    reopened.shutdown().unwrap();
}
