//! Criterion benchmarks for every compiled variant of the kernel families.
//!
//! Run with: cargo bench --bench kernels

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pktgen_kernels::kernels::families::{
    CHECKSUM, FILL_CONST, FILL_INCR, PRBS_FILL, PRBS_VERIFY, SIGNATURE_DECODE, SIGNATURE_ENCODE,
    UNPACK_AND_SUM,
};
use pktgen_kernels::kernels::indexical;
use pktgen_kernels::kernels::signature::SIGNATURE_LEN;
use pktgen_kernels::{batch, KernelFamily, Signature, Variant};
use std::hint::black_box;

/// Typical payload sizes: minimum frame, IMIX middle, MTU, jumbo.
const SIZES: [usize; 4] = [64, 576, 1500, 9000];

/// Signatures per batch.
const BATCH: usize = 64;

/// Every variant of `family` this machine can run.
fn runnable<F: Copy + Send + Sync + 'static>(family: &KernelFamily<F>) -> Vec<(Variant, F)> {
    family
        .variants()
        .filter_map(|v| family.runnable(v).map(|f| (v, f)))
        .collect()
}

fn bench_prbs(c: &mut Criterion) {
    let mut group = c.benchmark_group("prbs_fill");
    for size in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        for (variant, f) in runnable(&PRBS_FILL) {
            let mut buf = vec![0u8; size];
            group.bench_with_input(BenchmarkId::new(variant.name(), size), &size, |b, _| {
                b.iter(|| unsafe { f(black_box(&mut buf), 0x1234) })
            });
        }
    }
    group.finish();

    let mut group = c.benchmark_group("prbs_verify");
    for size in SIZES {
        let mut buf = vec![0u8; size];
        batch::fill_prbs(&mut [&mut buf[..]], 0x1234).unwrap_or_default();
        group.throughput(Throughput::Bytes(size as u64));
        for (variant, f) in runnable(&PRBS_VERIFY) {
            group.bench_with_input(BenchmarkId::new(variant.name(), size), &buf, |b, buf| {
                b.iter(|| unsafe { f(black_box(buf)) })
            });
        }
    }
    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in SIZES {
        let buf: Vec<u8> = (0..size).map(|i| i as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        for (variant, f) in runnable(&CHECKSUM) {
            group.bench_with_input(BenchmarkId::new(variant.name(), size), &buf, |b, buf| {
                b.iter(|| unsafe { f(black_box(buf)) })
            });
        }
    }
    group.finish();
}

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill");
    for size in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        for (variant, f) in runnable(&FILL_CONST) {
            let mut buf = vec![0u8; size];
            let id = BenchmarkId::new(format!("const/{}", variant.name()), size);
            group.bench_with_input(id, &size, |b, _| b.iter(|| unsafe { f(black_box(&mut buf), 0x5a) }));
        }
        for (variant, f) in runnable(&FILL_INCR) {
            let mut buf = vec![0u8; size];
            let id = BenchmarkId::new(format!("incr/{}", variant.name()), size);
            group.bench_with_input(id, &size, |b, _| b.iter(|| unsafe { f(black_box(&mut buf), 0x5a) }));
        }
    }
    group.finish();
}

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    group.throughput(Throughput::Elements(BATCH as u64));

    let stream_ids: Vec<u32> = (0..BATCH as u32).map(|i| i % 8).collect();
    let sequences: Vec<u32> = (0..BATCH as u32).collect();
    for (variant, f) in runnable(&SIGNATURE_ENCODE) {
        let mut storage = vec![[0u8; SIGNATURE_LEN]; BATCH];
        let mut dests: Vec<&mut [u8]> = storage.iter_mut().map(|r| &mut r[..]).collect();
        group.bench_function(BenchmarkId::new("encode", variant.name()), |b| {
            b.iter(|| unsafe { f(black_box(&mut dests), &stream_ids, &sequences, 0, 1_000) })
        });
    }

    let records: Vec<[u8; SIGNATURE_LEN]> = (0..BATCH as u32)
        .map(|i| Signature::new(i % 8, i, 1_000 + i as u64, 0).to_bytes())
        .collect();
    let candidates: Vec<&[u8]> = records.iter().map(|r| &r[..]).collect();
    for (variant, f) in runnable(&SIGNATURE_DECODE) {
        let mut out = vec![Signature::default(); BATCH];
        group.bench_function(BenchmarkId::new("decode", variant.name()), |b| {
            b.iter(|| unsafe { f(black_box(&candidates), &mut out) })
        });
    }
    group.finish();
}

fn bench_indexicals(c: &mut Criterion) {
    let mut group = c.benchmark_group("unpack_and_sum");
    let values: Vec<u32> = (0..4096u32).map(|i| i.wrapping_mul(0x9e37_79b9)).collect();
    let masks = [0x0000_00ffu32, 0x000f_ff00, 0xf000_0000];
    group.throughput(Throughput::Elements(values.len() as u64));

    for (variant, f) in runnable(&UNPACK_AND_SUM) {
        let mut storage: Vec<Vec<u32>> = masks
            .iter()
            .map(|&m| vec![0u32; indexical::bucket_count(m)])
            .collect();
        let mut counters: Vec<&mut [u32]> = storage.iter_mut().map(|c| &mut c[..]).collect();
        group.bench_function(variant.name(), |b| {
            b.iter(|| unsafe { f(black_box(&values), &masks, &mut counters) })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_prbs,
    bench_checksum,
    bench_fill,
    bench_signatures,
    bench_indexicals
);
criterion_main!(benches);
