//! Criterion benchmarks for search engine core operations.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the core operations in isolation, using
//! synthetic data to ensure reproducibility across machines.

use std::collections::{HashMap, HashSet};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use gramsearch::ngram::extract_ngrams;
use gramsearch::varint;

// ─── Helpers ─────────────────────────────────────────────────────────

/// Builds a synthetic source-like buffer of roughly `len` bytes.
fn synthetic_source(len: usize) -> String {
    let line = "public class HttpClient { void connect(string host, int port) { return; } }\n";
    line.repeat(len / line.len() + 1)
}

/// Builds N posting sets of `ids_per_set` ids each, with a controlled
/// amount of overlap to make intersection nontrivial.
fn synthetic_postings(num_sets: usize, ids_per_set: usize) -> Vec<HashSet<i64>> {
    (0..num_sets)
        .map(|s| {
            (0..ids_per_set)
                .map(|i| (i * (s + 1)) as i64 % 1_000_000)
                .collect()
        })
        .collect()
}

// ─── Varint codec (C1) ───────────────────────────────────────────────

fn bench_varint_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_encode");
    for &n in &[0u64, 127, 128, 16_383, 1_000_000, u32::MAX as u64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| varint::encode(black_box(n)));
        });
    }
    group.finish();
}

fn bench_varint_decode_stream(c: &mut Criterion) {
    let ids: Vec<u64> = (0..10_000).map(|i| i * 37 % 1_000_000).collect();
    let encoded = varint::encode_all(ids.iter().copied());

    c.bench_function("varint_decode_10k_stream", |b| {
        b.iter(|| varint::decode_all(black_box(&encoded)).unwrap());
    });
}

// ─── Sparse n-gram extractor (C2) ────────────────────────────────────

fn bench_ngram_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("ngram_extract");
    for &len in &[256usize, 4096, 65536] {
        let source = synthetic_source(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &source, |b, source| {
            b.iter(|| extract_ngrams(black_box(source), 3));
        });
    }
    group.finish();
}

// ─── Posting intersection (C6) ───────────────────────────────────────

fn bench_posting_intersection(c: &mut Criterion) {
    let sets = synthetic_postings(4, 5_000);

    c.bench_function("intersect_4_postings_5k_each", |b| {
        b.iter(|| {
            let mut iter = sets.iter();
            let first = iter.next().unwrap().clone();
            iter.fold(first, |acc, set| {
                acc.intersection(black_box(set)).cloned().collect()
            })
        });
    });
}

fn bench_posting_union(c: &mut Criterion) {
    let sets = synthetic_postings(8, 2_000);

    c.bench_function("union_8_postings_2k_each", |b| {
        b.iter(|| {
            let mut merged: HashMap<i64, ()> = HashMap::new();
            for set in &sets {
                for id in black_box(set) {
                    merged.insert(*id, ());
                }
            }
            merged.len()
        });
    });
}

criterion_group!(
    benches,
    bench_varint_encode,
    bench_varint_decode_stream,
    bench_ngram_extraction,
    bench_posting_intersection,
    bench_posting_union,
);
criterion_main!(benches);
