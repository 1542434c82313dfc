use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ring_cache::{Cache, Config};

fn bench_set_get(c: &mut Criterion) {
    let cache = Cache::new(Config::default());
    let mut group = c.benchmark_group("small_value");

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = i.to_be_bytes();
            cache.set(black_box(&key), black_box(b"payload")).unwrap();
            i += 1;
        });
    });

    cache.set(b"bench-key", b"payload").unwrap();
    group.bench_function("get_hit", |b| {
        b.iter(|| black_box(cache.get(black_box(b"bench-key"))));
    });
    group.bench_function("get_miss", |b| {
        b.iter(|| black_box(cache.get(black_box(b"absent-key"))));
    });

    group.finish();
}

fn bench_large_value(c: &mut Criterion) {
    let cache = Cache::new(Config { max_bytes: 256 << 20, ..Config::default() });
    let value = vec![0x42u8; 256 * 1024];

    let mut group = c.benchmark_group("fragmented_value");
    group.bench_function("set_256kb", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = i.to_be_bytes();
            cache.set(black_box(&key), black_box(&value)).unwrap();
            i += 1;
        });
    });

    cache.set(b"large-bench-key", &value).unwrap();
    group.bench_function("get_256kb", |b| {
        b.iter(|| black_box(cache.get(black_box(b"large-bench-key"))));
    });
    group.finish();
}

fn bench_counters(c: &mut Criterion) {
    let cache = Cache::new(Config::default());
    c.bench_function("incr", |b| {
        b.iter(|| black_box(cache.incr(black_box(b"counter"), 1).unwrap()));
    });
}

fn bench_ttl(c: &mut Criterion) {
    let cache = Cache::new(Config::default());
    cache.set_with_ttl(b"ttl-key", b"v", Some(Duration::from_secs(3600))).unwrap();
    c.bench_function("get_with_live_ttl", |b| {
        b.iter(|| black_box(cache.get(black_box(b"ttl-key"))));
    });
}

criterion_group!(benches, bench_set_get, bench_large_value, bench_counters, bench_ttl);
criterion_main!(benches);
