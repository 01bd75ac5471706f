//! Envelope and atomic file write benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docvault_bench::random_data;
use docvault_storage::{write_atomic, EncryptionKey, Envelope};
use tempfile::TempDir;

/// Benchmark sealing and opening payloads.
fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let envelope = Envelope::new(&EncryptionKey::generate());

    for size in [256, 4096, 64 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = random_data(*size);

        group.bench_with_input(BenchmarkId::new("seal", size), &data, |b, data| {
            b.iter(|| black_box(envelope.seal(black_box(data)).unwrap()));
        });

        let sealed = envelope.seal(&data).unwrap();
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, sealed| {
            b.iter(|| black_box(envelope.open(black_box(sealed)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark temp-file-and-rename writes.
fn bench_write_atomic(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_atomic");
    // fsync dominates; fewer samples keep runs short
    group.sample_size(20);

    for size in [256, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("doc.json");
            let data = random_data(size);

            b.iter(|| write_atomic(black_box(&path), black_box(&data)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark passphrase key derivation.
fn bench_key_derivation(c: &mut Criterion) {
    c.bench_function("derive_from_passphrase", |b| {
        b.iter(|| {
            black_box(
                EncryptionKey::derive_from_passphrase(black_box(b"correct horse"), b"salt")
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_envelope, bench_write_atomic, bench_key_derivation);
criterion_main!(benches);
