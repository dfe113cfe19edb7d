//! Buffer pool benchmarks.
//!
//! Measures buffer pool performance for:
//! - Page allocation
//! - Pin/unpin operations
//! - Cache hit/miss scenarios
//! - Eviction under pressure
//! - Page table insert/find

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quarry::{
    BufferPoolConfig, BufferPoolManager, ExtendibleHashTable, FileDiskManager, PageId,
};
use tempfile::TempDir;

fn create_pool(pool_size: usize) -> (BufferPoolManager, TempDir) {
    let temp_dir = TempDir::new().expect("create temp dir");
    let db_path = temp_dir.path().join("bench.db");
    let disk = FileDiskManager::new(&db_path).expect("create disk manager");
    let config = BufferPoolConfig {
        pool_size,
        ..BufferPoolConfig::default()
    };
    let pool = BufferPoolManager::new(config, Box::new(disk), None).expect("create pool");
    (pool, temp_dir)
}

/// Benchmark page allocation
fn bench_page_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_allocation");

    for pool_size in &[64, 128, 256, 512] {
        let (pool, _temp) = create_pool(*pool_size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), pool_size, |b, _| {
            b.iter(|| {
                let handle = pool.new_page().expect("allocate page");
                let page_id = handle.page_id();
                drop(handle);
                pool.unpin_page(page_id, false);
                black_box(page_id)
            });
        });
    }

    group.finish();
}

/// Benchmark sequential page access (cache hits)
fn bench_sequential_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_sequential");

    let (pool, _temp) = create_pool(256);

    let mut page_ids = Vec::new();
    for _ in 0..100 {
        let id = pool.new_page().expect("allocate page").page_id();
        pool.unpin_page(id, false);
        page_ids.push(id);
    }

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_pages_sequential", |b| {
        b.iter(|| {
            for &page_id in &page_ids {
                let handle = pool.fetch_page(page_id).expect("fetch page");
                black_box(handle.data()[0]);
                drop(handle);
                pool.unpin_page(page_id, false);
            }
        });
    });

    group.finish();
}

/// Benchmark random page access
fn bench_random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_random");

    let (pool, _temp) = create_pool(128);

    let mut page_ids = Vec::new();
    for _ in 0..100 {
        let id = pool.new_page().expect("allocate page").page_id();
        pool.unpin_page(id, false);
        page_ids.push(id);
    }
    pool.flush_all_pages().expect("flush");

    // Generate pseudo-random access pattern
    let mut access_pattern = Vec::new();
    let mut seed: u32 = 12345;
    for _ in 0..1000 {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        access_pattern.push(page_ids[(seed as usize) % page_ids.len()]);
    }

    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_random_accesses", |b| {
        b.iter(|| {
            for &page_id in &access_pattern {
                let handle = pool.fetch_page(page_id).expect("fetch page");
                black_box(handle.data()[0]);
                drop(handle);
                pool.unpin_page(page_id, false);
            }
        });
    });

    group.finish();
}

/// Benchmark eviction under memory pressure
fn bench_eviction_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_eviction");

    // Small pool to force evictions
    let pool_size = 32;
    let access_pages = 100; // More pages than the pool can hold

    let (pool, _temp) = create_pool(pool_size);

    let mut page_ids = Vec::new();
    for _ in 0..access_pages {
        let id = pool.new_page().expect("allocate page").page_id();
        pool.unpin_page(id, false);
        page_ids.push(id);
    }
    pool.flush_all_pages().expect("flush");

    group.throughput(Throughput::Elements(access_pages as u64));
    group.bench_function("eviction_heavy", |b| {
        b.iter(|| {
            // Access all pages sequentially, causing many evictions
            for &page_id in &page_ids {
                let handle = pool.fetch_page(page_id).expect("fetch page");
                black_box(handle.data()[0]);
                drop(handle);
                pool.unpin_page(page_id, false);
            }
        });
    });

    group.finish();
}

/// Benchmark page table insert/find
fn bench_page_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_table");

    group.throughput(Throughput::Elements(1024));
    group.bench_function("1024_inserts", |b| {
        b.iter(|| {
            let table = ExtendibleHashTable::new(8);
            for i in 0..1024u32 {
                table.insert(PageId::new(i), i as usize);
            }
            black_box(table.num_buckets())
        });
    });

    let table = ExtendibleHashTable::new(8);
    for i in 0..1024u32 {
        table.insert(PageId::new(i), i as usize);
    }

    group.throughput(Throughput::Elements(1024));
    group.bench_function("1024_finds", |b| {
        b.iter(|| {
            for i in 0..1024u32 {
                black_box(table.find(&PageId::new(i)));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_page_allocation,
    bench_sequential_access,
    bench_random_access,
    bench_eviction_pressure,
    bench_page_table
);
criterion_main!(benches);
