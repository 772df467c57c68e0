use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumen_engine::{AdaptiveLodController, ElementType, VolumeBuffer, VolumeDims, VolumePool};
use std::time::Duration;

fn bench_pool(c: &mut Criterion) {
    let dims = VolumeDims::new(64, 64, 64);

    c.bench_function("pool_acquire_release_64", |b| {
        let pool = VolumePool::new(4);
        pool.release(VolumeBuffer::zeroed(ElementType::U8, dims));
        b.iter(|| {
            let buffer = pool.acquire(Duration::ZERO, ElementType::U8, dims);
            pool.release(black_box(buffer));
        });
    });

    c.bench_function("fresh_alloc_64", |b| {
        b.iter(|| black_box(VolumeBuffer::zeroed(ElementType::U8, dims)));
    });
}

fn bench_lod(c: &mut Criterion) {
    c.bench_function("lod_full_sequence", |b| {
        let lod = AdaptiveLodController::new();
        lod.notify_max_steps(2000);
        b.iter(|| {
            lod.notify_change_occurred();
            while lod.is_kernel_run_needed() {
                black_box(lod.phase());
                lod.before_frame();
            }
        });
    });
}

criterion_group!(benches, bench_pool, bench_lod);
criterion_main!(benches);
