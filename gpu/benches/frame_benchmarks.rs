use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use redlilium_gpu::{
    BufferDescriptor, BufferUsage, DeletionQueue, DeviceConfig, DummyDriver, FrameCoordinator,
    GraphicsDevice, NativeHandle, ResourceKind,
};

fn device(threads: usize, frames: usize) -> Arc<GraphicsDevice> {
    GraphicsDevice::new(
        Arc::new(DummyDriver::headless()),
        DeviceConfig::new(threads, frames),
    )
    .expect("dummy device")
}

// ---------------------------------------------------------------------------
// Frame loop
// ---------------------------------------------------------------------------

fn bench_frame_loop(c: &mut Criterion) {
    let device = device(1, 2);
    let mut frames = FrameCoordinator::new(device.clone()).expect("frame coordinator");

    c.bench_function("frame_loop_single_primary", |b| {
        b.iter(|| {
            frames.new_frame();
            let cb = device.get_command_buffer(frames.current_frame_index(), 0, true);
            cb.end();
            frames.queue_command_buffer(cb);
            frames.present(None);
        });
    });
}

fn bench_frame_loop_with_compute(c: &mut Criterion) {
    let device = device(1, 3);
    let mut frames = FrameCoordinator::new(device.clone()).expect("frame coordinator");

    c.bench_function("frame_loop_async_compute", |b| {
        b.iter(|| {
            frames.new_frame();
            let slot = frames.current_frame_index();
            let cb = device.get_command_buffer(slot, 0, true);
            cb.end();
            frames.queue_command_buffer(cb);
            let compute = device.get_compute_command_buffer(slot, 0, true);
            compute.end();
            frames.present(Some(compute));
        });
    });
}

// ---------------------------------------------------------------------------
// Resource lifetime
// ---------------------------------------------------------------------------

fn bench_buffer_create_release(c: &mut Criterion) {
    let device = device(1, 2);
    let descriptor = BufferDescriptor::new(1024, BufferUsage::UNIFORM);

    c.bench_function("buffer_create_release", |b| {
        b.iter(|| {
            let buffer = device.create_buffer(&descriptor);
            black_box(&buffer);
        });
        device.deletion_queue().flush(device.driver().as_ref());
        device.cleanup_dead_resources();
    });
}

fn bench_deletion_flush(c: &mut Criterion) {
    let driver = DummyDriver::headless();

    c.bench_function("deletion_queue_flush_retired_256", |b| {
        b.iter_batched(
            || {
                let queue = DeletionQueue::new();
                for frame in 0..4u64 {
                    queue.set_current_frame(frame);
                    for i in 0..64 {
                        queue.enqueue(
                            ResourceKind::Sampler,
                            NativeHandle::from_raw(frame * 64 + i + 1),
                            None,
                        );
                    }
                }
                queue
            },
            |queue| black_box(queue.flush_retired(&driver, 3)),
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

fn bench_pool_index(c: &mut Criterion) {
    let device = device(8, 3);
    let pools = device.command_buffers().pools();

    c.bench_function("pool_index_8x3", |b| {
        b.iter(|| {
            let mut sum = 0;
            for frame in 0..3 {
                for thread in 0..8 {
                    sum += pools.pool_index(black_box(frame), black_box(thread));
                }
            }
            sum
        });
    });
}

criterion_group!(
    benches,
    bench_frame_loop,
    bench_frame_loop_with_compute,
    bench_buffer_create_release,
    bench_deletion_flush,
    bench_pool_index,
);
criterion_main!(benches);
