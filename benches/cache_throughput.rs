/// Benchmark for two-tier cache throughput
///
/// Measures write-through sets, memory-tier hits, persistent-tier promotions
/// under a tight memory budget, and tag revalidation.
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tiercache::{CacheConfig, CacheManager, CachedValue};

fn report(label: &str, iterations: usize, elapsed: Duration) {
    println!("  Iterations: {}", iterations);
    println!("  Time: {:?}", elapsed);
    println!(
        "  Throughput: {:.0} ops/sec",
        iterations as f64 / elapsed.as_secs_f64()
    );
    println!("  ({})", label);
    println!();
}

fn main() {
    println!("=== Two-Tier Cache Throughput Benchmark ===\n");

    let temp_dir = tempdir().unwrap();
    let iterations = 2_000;
    let payload = CachedValue::raw(vec![42u8; 512]);

    // Relaxed durability so the numbers reflect the cache, not fsync
    let config = CacheConfig::at_path(temp_dir.path().join("bench_cache"))
        .with_sync_writes(false)
        .with_sweep_interval_secs(0);
    let cache = CacheManager::new(config).expect("Failed to open cache");

    println!("📊 Benchmark: set() with write-through");
    let start = Instant::now();
    for i in 0..iterations {
        cache.set_with_tags(
            &format!("key-{}", i),
            payload.clone(),
            None,
            [format!("group-{}", i % 10)],
        );
    }
    report("sets", iterations, start.elapsed());

    println!("📊 Benchmark: get() served from memory");
    let start = Instant::now();
    for i in 0..iterations {
        let _ = cache.get(&format!("key-{}", i));
    }
    report("memory hits", iterations, start.elapsed());

    println!("📊 Benchmark: revalidate_tag() over 10 groups");
    let start = Instant::now();
    for group in 0..10 {
        cache.revalidate_tag(&format!("group-{}", group));
    }
    report("tag revalidations", 10, start.elapsed());
    cache.shutdown().expect("Failed to shut down cache");
    drop(cache);

    // Budget of roughly 64 entries forces most reads through the disk tier
    let config = CacheConfig::at_path(temp_dir.path().join("bench_cache_small"))
        .with_sync_writes(false)
        .with_sweep_interval_secs(0)
        .with_max_memory_bytes(64 * 700);
    let cache = CacheManager::new(config).expect("Failed to open cache");
    for i in 0..iterations {
        cache.set(&format!("key-{}", i), payload.clone(), None);
    }

    println!("📊 Benchmark: get() promoted from the persistent tier");
    let start = Instant::now();
    for i in 0..iterations {
        let _ = cache.get(&format!("key-{}", i));
    }
    report("persistent hits", iterations, start.elapsed());

    let stats = cache.stats();
    println!("=== Summary ===");
    println!("  Memory hits:     {}", stats.memory_hits);
    println!("  Persistent hits: {}", stats.persistent_hits);
    println!("  Evictions:       {}", stats.evictions);
    println!("  Hit rate:        {:.1}%", stats.hit_rate() * 100.0);

    cache.shutdown().expect("Failed to shut down cache");
}
