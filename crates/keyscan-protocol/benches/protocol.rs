//! Micro-benchmarks for reply parsing and command encoding.
//!
//! Run with `cargo bench -p keyscan-protocol`.

use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, Criterion};
use keyscan_protocol::{encode_command, encode_pipeline, parse_frame};

/// Raw bytes of a SCAN reply carrying `keys` names of the form `key:<n>`.
fn scan_reply(keys: usize) -> Vec<u8> {
    let mut out = format!("*2\r\n$6\r\n123456\r\n*{keys}\r\n");
    for i in 0..keys {
        let name = format!("key:{i}");
        out.push_str(&format!("${}\r\n{}\r\n", name.len(), name));
    }
    out.into_bytes()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("integer", |b| {
        b.iter(|| black_box(parse_frame(b":1048576\r\n").unwrap().unwrap()));
    });

    let small = scan_reply(10);
    group.bench_function("scan_reply_10", |b| {
        b.iter(|| black_box(parse_frame(&small).unwrap().unwrap()));
    });

    let large = scan_reply(2000);
    group.bench_function("scan_reply_2000", |b| {
        b.iter(|| black_box(parse_frame(&large).unwrap().unwrap()));
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let scan: Vec<Bytes> = ["SCAN", "0", "MATCH", "user:*", "COUNT", "200", "TYPE", "hash"]
        .iter()
        .map(|s| Bytes::from_static(s.as_bytes()))
        .collect();
    group.bench_function("scan_command", |b| {
        let mut buf = BytesMut::with_capacity(128);
        b.iter(|| {
            buf.clear();
            encode_command(&scan, &mut buf);
            black_box(&buf);
        });
    });

    let ttls: Vec<Vec<Bytes>> = (0..200)
        .map(|i| vec![Bytes::from_static(b"TTL"), Bytes::from(format!("key:{i}"))])
        .collect();
    group.bench_function("ttl_pipeline_200", |b| {
        let mut buf = BytesMut::with_capacity(8192);
        b.iter(|| {
            buf.clear();
            encode_pipeline(&ttls, &mut buf);
            black_box(&buf);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_encode);
criterion_main!(benches);
