//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::mem::MaybeUninit;
use std::time::Instant;

use alloc_tracker::Allocator;
use block_pool::BlockPool;
use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("block_basic");

    let allocs_op = allocs.operation("build");
    group.bench_function("build", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(BlockPool::new(nz!(64), nz!(1024))));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("acquire_release_raw");
    group.bench_function("acquire_release_raw", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::new(nz!(64), nz!(16));

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let block = black_box(pool.acquire().unwrap());
                pool.release(block).unwrap();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("acquire_release_typed");
    group.bench_function("acquire_release_typed", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::builder()
                .block_size_of::<TestItem>()
                .block_count(nz!(16))
                .build();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let block = pool.acquire_typed(black_box(TEST_VALUE)).unwrap();
                _ = black_box(*block);
                pool.release_typed(block).unwrap();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("acquire_with_large");
    group.bench_function("acquire_with_large", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::builder()
                .block_size_of::<[u8; 4096]>()
                .block_count(nz!(4))
                .build();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                // SAFETY: The closure initializes the whole array.
                let block = unsafe {
                    pool.acquire_with(|uninit: &mut MaybeUninit<[u8; 4096]>| {
                        uninit.write([0xAB; 4096]);
                    })
                }
                .unwrap();

                _ = black_box(block.ptr());
                pool.release_typed(block).unwrap();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("fill_and_drain_1k");
    group.bench_function("fill_and_drain_1k", |b| {
        b.iter_custom(|iters| {
            let pools = iter::repeat_with(|| {
                BlockPool::builder()
                    .block_size_of::<TestItem>()
                    .block_count(nz!(1000))
                    .build()
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &pools {
                let blocks = iter::repeat_with(|| pool.acquire_typed(TEST_VALUE).unwrap())
                    .take(1000)
                    .collect::<Vec<_>>();

                for block in blocks {
                    pool.release_typed(block).unwrap();
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("release_shared_checked");
    group.bench_function("release_shared_checked", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::new(nz!(64), nz!(16));

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let block = pool.acquire().unwrap().into_shared();
                pool.release_shared(black_box(block)).unwrap();
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
