//! Performance benchmarks for xipc
//!
//! Run with: cargo bench --package xipc-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use xipc_core::{Semaphore, SharedRegion};

fn bench_region_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_lifecycle");

    for size in [4096, 65536, 1048576].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let id = SharedRegion::create(size).unwrap();
                let region = SharedRegion::attach(id, size).unwrap();
                black_box(region.as_ptr());
                region.detach().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_region_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_write_read");

    for size in [1024, 4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let id = SharedRegion::create(size).unwrap();
            let mut region = SharedRegion::attach(id, size).unwrap();
            let data = vec![42u8; size];

            b.iter(|| {
                region.as_mut_slice().copy_from_slice(&data);
                let sum: u64 = region.as_slice().iter().map(|&x| x as u64).sum();
                black_box(sum);
            });

            region.detach().unwrap();
        });
    }
    group.finish();
}

fn bench_semaphore_ops(c: &mut Criterion) {
    let sem = Semaphore::create(1).unwrap();
    let mut group = c.benchmark_group("semaphore");

    group.bench_function("lock_unlock", |b| {
        b.iter(|| {
            black_box(sem.lock().unwrap());
            sem.unlock().unwrap();
        });
    });

    group.bench_function("try_lock_unlock", |b| {
        b.iter(|| {
            if sem.try_lock().unwrap() {
                sem.unlock().unwrap();
            }
        });
    });

    group.bench_function("guard", |b| {
        b.iter(|| {
            let guard = sem.acquire().unwrap();
            black_box(&guard);
        });
    });

    group.bench_function("value", |b| {
        b.iter(|| black_box(sem.value().unwrap()));
    });

    group.finish();
    sem.destroy();
}

criterion_group!(
    benches,
    bench_region_lifecycle,
    bench_region_write_read,
    bench_semaphore_ops
);
criterion_main!(benches);
