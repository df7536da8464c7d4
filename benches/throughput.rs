//! Throughput Benchmark for respcache
//!
//! Measures the paths a SET/GET pair goes through: value classification on
//! write, unescaping on read, conditional writes, stale expiry records and
//! request parsing.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use respcache::protocol::RespParser;
use respcache::storage::{SetCondition, StorageEngine, StoredValue};
use std::sync::Arc;

/// Benchmark value classification at write time
fn bench_store(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    let plain = Bytes::from("plain value with no quotes");
    let quoted = Bytes::from(r#""line1\nline2\té end""#);
    let broken = Bytes::from("\"starts with a quote but never ends");

    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    for (name, raw) in [("plain", &plain), ("quoted", &quoted), ("broken_quote", &broken)] {
        group.bench_function(name, |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = Bytes::from(format!("{}:{}", name, i % 10_000));
                engine.store(key, StoredValue::new(raw.clone()));
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark GET replies for plain and quoted values
fn bench_load(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    engine.store(Bytes::from("plain"), StoredValue::from("plain value"));
    engine.store(Bytes::from("quoted"), StoredValue::from(r#""a\tb\x41é""#));

    let mut group = c.benchmark_group("load");
    group.throughput(Throughput::Elements(1));

    for key in ["plain", "quoted", "missing"] {
        group.bench_function(key, |b| {
            b.iter(|| black_box(engine.load(key.as_bytes()).map(|value| value.decoded())));
        });
    }

    group.finish();
}

/// Benchmark NX/XX writes, both the success and the refused path
fn bench_conditional(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..1_000 {
        engine.store(Bytes::from(format!("present:{}", i)), StoredValue::from("v"));
    }

    let mut group = c.benchmark_group("conditional");
    group.throughput(Throughput::Elements(1));

    group.bench_function("nx_refused", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("present:{}", i % 1_000));
            black_box(engine.store_if(key, StoredValue::from("v2"), SetCondition::IfAbsent));
            i += 1;
        });
    });

    group.bench_function("xx_applied", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("present:{}", i % 1_000));
            black_box(engine.store_if(key, StoredValue::from("v3"), SetCondition::IfPresent));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark expiry records hitting overwritten keys
fn bench_stale_expiry(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("stale_generation", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("k:{}", i % 1_000));
            let stale = engine.store(key.clone(), StoredValue::from("v1"));
            engine.store(key.clone(), StoredValue::from("v2"));
            black_box(engine.delete_if_generation(&key, stale));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark request parsing
fn bench_parser(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let multibulk: Vec<u8> = b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n".repeat(100);
    let inline: Vec<u8> = b"SET key \"quoted value\" EX 10\r\n".repeat(100);

    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Elements(100));

    for (name, input) in [("multibulk", &multibulk), ("inline", &inline)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut parser = RespParser::new(input.as_slice());
                    while let Ok(Some(command)) = parser.next_command().await {
                        black_box(command);
                    }
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_store,
    bench_load,
    bench_conditional,
    bench_stale_expiry,
    bench_parser,
);

criterion_main!(benches);
