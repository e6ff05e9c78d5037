//! Frame pacing and resource lifetime integration tests.
//!
//! Tests are parameterized using `rstest` to run against every driver.
//! Assertions about individual driver calls only run on the dummy driver,
//! which records them; the Vulkan cases check the same flows don't fail.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p redlilium-gpu --test frame_tests
//!
//! # Include the Vulkan cases
//! cargo test -p redlilium-gpu --test frame_tests --features vulkan-backend
//! ```

mod common;

use std::collections::HashMap;

use rstest::rstest;

use common::{Backend, TestContext};
use redlilium_gpu::driver::dummy::{DummyObjectKind, RecordedCommand};
use redlilium_gpu::driver::{BufferCopy, WaitStage};
use redlilium_gpu::{
    AttachmentTarget, BufferUsage, ColorAttachment, DeviceConfig, DriverStatus, GpuResource,
    NativeHandle, QueueKind, RenderPassDescriptor, ResourceState, TextureDescriptor,
    TextureFormat, TextureUsage,
};

// ============================================================================
// Resource Lifetime
// ============================================================================

/// Released resources wait in the deletion queue until their frame retires.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_released_buffers_flushed_after_frame(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let buffers: Vec<_> = (0..3)
        .map(|_| ctx.create_buffer(256, BufferUsage::UNIFORM))
        .collect();
    let natives: Vec<NativeHandle> = buffers.iter().map(|b| b.native()).collect();
    drop(buffers);

    let queue = ctx.device.deletion_queue().clone();
    assert_eq!(queue.pending_count(), 3);

    ctx.run_frame();
    ctx.frames.wait_idle();
    assert!(queue.is_empty());

    if let Some(dummy) = ctx.dummy() {
        for native in natives {
            assert_eq!(dummy.destroy_count_of(native), 1);
        }
    }
}

/// A resource is destroyed once, only after its last handle is released.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_destroyed_exactly_once_after_last_release(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let buffer = ctx.create_buffer(64, BufferUsage::VERTEX);
    let native = buffer.native();
    let copies: Vec<_> = (0..4).map(|_| buffer.clone()).collect();
    drop(buffer);

    ctx.run_frames(3);
    assert_eq!(ctx.device.deletion_queue().pending_count(), 0);
    if let Some(dummy) = ctx.dummy() {
        assert_eq!(dummy.destroy_count_of(native), 0);
    }

    drop(copies);
    ctx.run_frames(3);
    ctx.frames.wait_idle();
    if let Some(dummy) = ctx.dummy() {
        assert_eq!(dummy.destroy_count_of(native), 1);
    }
    assert_eq!(ctx.device.cleanup_dead_resources(), 0);
}

/// Deletions wait for the GPU, not just for the CPU to move on.
#[test]
fn test_no_flush_before_slot_retired() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    dummy.set_auto_complete(false);

    let first = ctx.create_buffer(64, BufferUsage::STORAGE);
    let first_native = first.native();
    ctx.frames.new_frame();
    drop(first);
    ctx.frames.present(None);

    let second = ctx.create_buffer(64, BufferUsage::STORAGE);
    let second_native = second.native();
    ctx.frames.new_frame();
    drop(second);
    ctx.frames.present(None);

    // Nothing completed on the GPU yet.
    assert_eq!(dummy.destroy_count_of(first_native), 0);
    assert_eq!(dummy.destroy_count_of(second_native), 0);
    assert_eq!(ctx.frames.frames_pending_retirement(), 2);

    // Reusing slot 0 blocks on frame 0 only.
    ctx.frames.new_frame();
    assert_eq!(dummy.destroy_count_of(first_native), 1);
    assert_eq!(dummy.destroy_count_of(second_native), 0);
    ctx.frames.present(None);

    dummy.complete_all();
    ctx.run_frame();
    assert_eq!(dummy.destroy_count_of(second_native), 1);
    assert!(dummy.timeline_violations().is_empty());
}

/// Completing a timeline by hand retires frames without a CPU wait.
#[test]
fn test_manual_completion_retires_frame() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    dummy.set_auto_complete(false);

    let buffer = ctx.create_buffer(16, BufferUsage::COPY_SRC);
    let native = buffer.native();
    ctx.frames.new_frame();
    drop(buffer);
    ctx.frames.present(None);
    assert_eq!(ctx.device.deletion_queue().pending_count(), 1);

    dummy.complete_timeline(ctx.frames.graphics_timeline(), 1);
    ctx.frames.new_frame();
    assert_eq!(dummy.destroy_count_of(native), 1);
    assert!(dummy.cpu_waits().is_empty());
    assert_eq!(ctx.frames.stats().objects_destroyed, 1);
}

// ============================================================================
// Pools and Command Buffers
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_pool_indices_distinct(#[case] backend: Backend) {
    let Some(ctx) = TestContext::with_config(backend, DeviceConfig::new(2, 2)) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let pools = ctx.device.command_buffers().pools();
    assert_eq!(pools.pool_index(0, 0), 0);
    assert_eq!(pools.pool_index(0, 1), 1);
    assert_eq!(pools.pool_index(1, 0), 2);
    assert_eq!(pools.pool_index(1, 1), 3);
    assert_eq!(pools.slot_count(), 4);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_primary_budget_exhaustion_panics(#[case] backend: Backend) {
    let config = DeviceConfig::new(1, 2).with_command_buffer_budget(3, 1, 1);
    let Some(ctx) = TestContext::with_config(backend, config) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let handed_out: Vec<_> = (0..3)
        .map(|_| ctx.device.get_command_buffer(0, 0, false))
        .collect();
    let mut natives: Vec<_> = handed_out.iter().map(|cb| cb.native()).collect();
    natives.dedup();
    assert_eq!(natives.len(), 3);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        ctx.device.get_command_buffer(0, 0, false)
    }));
    assert!(result.is_err());
}

/// Each frame resets the pools of the slot it reuses.
#[test]
fn test_new_frame_resets_slot_pools() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    let slot0 = *ctx.device.command_buffers().pools().pools(0, 0);
    let slot1 = *ctx.device.command_buffers().pools().pools(1, 0);

    ctx.run_frames(3);
    let resets = dummy.pool_resets();
    let count = |pool| resets.iter().filter(|&&p| p == pool).count();
    assert_eq!(count(slot0.graphics), 2);
    assert_eq!(count(slot1.graphics), 1);
    assert_eq!(count(slot0.compute), 2);
}

// ============================================================================
// Frame Pacing
// ============================================================================

/// The first frames never wait; once a slot is reused its previous frame is
/// waited on.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_first_frames_skip_timeline_wait(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let frames_in_flight = ctx.frames.max_frames_in_flight();

    ctx.run_frames(frames_in_flight);
    assert_eq!(ctx.frames.stats().cpu_waits, 0);
    if let Some(dummy) = ctx.dummy() {
        let graphics = ctx.frames.graphics_timeline();
        assert!(dummy.cpu_waits().is_empty());
        for submission in dummy.submissions() {
            assert!(submission.info.waits.iter().all(|w| w.semaphore != graphics));
        }
    }

    ctx.run_frame();
    assert_eq!(ctx.frames.stats().cpu_waits, 1);
    if let Some(dummy) = ctx.dummy() {
        let graphics = ctx.frames.graphics_timeline();
        assert_eq!(dummy.cpu_waits(), vec![(graphics, 1)]);

        let last = dummy.submissions().pop().unwrap();
        let timeline_waits: Vec<_> = last
            .info
            .waits
            .iter()
            .filter(|w| w.semaphore == graphics)
            .map(|w| w.value)
            .collect();
        assert_eq!(timeline_waits, vec![frames_in_flight as u64]);
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_counters_advance(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::with_config(backend, DeviceConfig::new(1, 3)) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    ctx.run_frames(7);
    let counters = ctx.frames.counters();
    assert_eq!(counters.absolute_frame_index, 7);
    assert_eq!(counters.current_frame_index, 7 % 3);
    assert_eq!(counters.graphics_timeline_value, 7);
    assert_eq!(counters.compute_timeline_value, 0);
    assert!(!ctx.frames.is_frame_open());
}

/// Signaled values increase per timeline and every wait targets a value
/// some submission signals.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_timeline_values_monotonic_with_async_compute(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    for _ in 0..10 {
        ctx.frames.new_frame();
        let slot = ctx.frames.current_frame_index();
        let cb = ctx.device.get_command_buffer(slot, 0, true);
        cb.end();
        ctx.frames.queue_command_buffer(cb);
        let compute = ctx.device.get_compute_command_buffer(slot, 0, true);
        compute.dispatch(8, 8, 1);
        compute.end();
        ctx.frames.present(Some(compute));
    }
    ctx.frames.wait_idle();

    let counters = ctx.frames.counters();
    assert_eq!(counters.graphics_timeline_value, 10);
    assert_eq!(counters.compute_timeline_value, 10);

    let Some(dummy) = ctx.dummy() else {
        return;
    };
    assert!(dummy.timeline_violations().is_empty());

    let mut last_signal: HashMap<NativeHandle, u64> = HashMap::new();
    for submission in dummy.submissions() {
        for wait in &submission.info.waits {
            if let Some(&signaled) = last_signal.get(&wait.semaphore) {
                assert!(wait.value <= signaled);
            }
        }
        for signal in &submission.info.signals {
            if signal.value == 0 {
                continue;
            }
            let previous = last_signal.insert(signal.semaphore, signal.value).unwrap_or(0);
            assert!(signal.value > previous);
        }
    }

    // Graphics waits on the compute value of the previous frame.
    let compute_timeline = ctx.frames.compute_timeline();
    let graphics_waits_on_compute = dummy
        .submissions()
        .iter()
        .filter(|s| s.queue == QueueKind::Graphics)
        .filter(|s| s.info.waits.iter().any(|w| w.semaphore == compute_timeline))
        .count();
    assert_eq!(graphics_waits_on_compute, 9);
}

#[test]
fn test_submit_compute_waits_on_graphics() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    ctx.frames.new_frame();
    let slot = ctx.frames.current_frame_index();
    let cb = ctx.device.get_command_buffer(slot, 0, true);
    cb.end();
    ctx.frames.queue_command_buffer(cb);
    ctx.frames.submit_queued_command_buffers();
    assert_eq!(ctx.frames.queued_count(), 0);

    let compute = ctx.device.get_compute_command_buffer(slot, 0, true);
    compute.end();
    ctx.frames.submit_compute_command_buffer(compute);

    let last = dummy.submissions().pop().unwrap();
    assert_eq!(last.queue, QueueKind::Compute);
    assert_eq!(last.info.waits.len(), 1);
    assert_eq!(last.info.waits[0].semaphore, ctx.frames.graphics_timeline());
    assert_eq!(last.info.waits[0].value, 1);

    ctx.frames.present(None);
    let present_submit = dummy.submissions().pop().unwrap();
    assert!(
        present_submit
            .info
            .waits
            .iter()
            .any(|w| w.semaphore == ctx.frames.compute_timeline() && w.value == 1)
    );
    assert!(dummy.timeline_violations().is_empty());
}

/// Submitting mid-frame after an acquire waits on the image; `present`
/// then does not wait on it a second time.
#[test]
fn test_mid_frame_submit_waits_on_acquired_image() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    ctx.run_frames(2);
    let graphics_timeline = ctx.frames.graphics_timeline();

    ctx.frames.new_frame();
    let backbuffer = ctx.frames.acquire_next_image().unwrap();
    let cb = ctx
        .device
        .get_command_buffer(ctx.frames.current_frame_index(), 0, true);
    cb.transition_backbuffer(&backbuffer, ResourceState::Present);
    cb.end();
    ctx.frames.queue_command_buffer(cb);
    ctx.frames.submit_queued_command_buffers();
    ctx.frames.present(None);

    let submissions = dummy.submissions();
    assert_eq!(submissions.len(), 4);
    let is_image_wait = |wait: &&redlilium_gpu::driver::SemaphoreWait| {
        wait.stage == WaitStage::ColorOutput && wait.value == 0
    };

    let mid_frame = &submissions[2];
    assert_eq!(mid_frame.info.command_buffers.len(), 1);
    assert_eq!(mid_frame.info.waits.iter().filter(is_image_wait).count(), 1);
    // Frame 2 runs after frame 1's graphics work.
    assert!(
        mid_frame
            .info
            .waits
            .iter()
            .any(|w| w.semaphore == graphics_timeline && w.value == 2)
    );

    let present_submit = &submissions[3];
    assert!(present_submit.info.command_buffers.is_empty());
    assert_eq!(present_submit.info.waits.iter().filter(is_image_wait).count(), 0);
    assert!(
        !present_submit
            .info
            .waits
            .iter()
            .any(|w| w.semaphore == graphics_timeline)
    );
    assert_eq!(dummy.presents().len(), 3);
    assert!(dummy.timeline_violations().is_empty());
}

#[test]
fn test_queue_rejects_foreign_buffers() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    ctx.frames.new_frame();

    let other_slot = ctx.device.get_command_buffer(1, 0, true);
    ctx.frames.queue_command_buffer(other_slot);
    let compute = ctx.device.get_compute_command_buffer(0, 0, true);
    ctx.frames.queue_command_buffer(compute);
    let secondary = ctx.device.get_command_buffer_secondary(0, 0);
    ctx.frames.queue_command_buffer(secondary);
    assert_eq!(ctx.frames.queued_count(), 0);

    let own = ctx.device.get_command_buffer(0, 0, true);
    ctx.frames.queue_command_buffer(own);
    assert_eq!(ctx.frames.queued_count(), 1);
}

#[test]
fn test_timestamps_read_back_after_slot_retires() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();

    ctx.frames.new_frame();
    let cb = ctx.device.get_command_buffer(0, 0, true);
    assert_eq!(cb.write_timestamp(), Some(0));
    assert_eq!(cb.write_timestamp(), Some(1));
    cb.end();
    ctx.frames.queue_command_buffer(cb);
    ctx.frames.present(None);
    assert!(ctx.frames.last_gpu_timings().is_empty());

    ctx.run_frame();
    // Slot 0 is reused: frame 0's timestamps become readable.
    ctx.frames.new_frame();
    let timings = ctx.frames.last_gpu_timings();
    assert_eq!(timings.len(), 1);
    assert_eq!(timings[0].frame, 0);
    assert_eq!(timings[0].ticks.len(), 2);
    assert_eq!(timings[0].elapsed_ns(), 1000.0);
}

/// Once the GPU is idle, resources released in the open frame go too.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_wait_idle_flushes_open_frame_releases(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    ctx.run_frame();
    ctx.frames.new_frame();
    let buffer = ctx.create_buffer(128, BufferUsage::STORAGE);
    let native = buffer.native();
    drop(buffer);
    assert_eq!(ctx.device.deletion_queue().pending_count(), 1);

    ctx.frames.wait_idle();
    assert!(ctx.device.deletion_queue().is_empty());
    if let Some(dummy) = ctx.dummy() {
        assert_eq!(dummy.destroy_count_of(native), 1);
    }
}

/// Queued buffers may still reference open-frame releases.
#[test]
fn test_wait_idle_keeps_releases_while_buffers_queued() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    ctx.frames.new_frame();
    let buffer = ctx.create_buffer(128, BufferUsage::VERTEX);
    let native = buffer.native();
    let cb = ctx
        .device
        .get_command_buffer(ctx.frames.current_frame_index(), 0, true);
    cb.bind_vertex_buffer(0, &buffer, 0);
    cb.end();
    ctx.frames.queue_command_buffer(cb);
    drop(buffer);

    ctx.frames.wait_idle();
    assert_eq!(ctx.device.deletion_queue().pending_count(), 1);
    assert_eq!(dummy.destroy_count_of(native), 0);

    ctx.frames.present(None);
    ctx.frames.wait_idle();
    assert!(ctx.device.deletion_queue().is_empty());
    assert_eq!(dummy.destroy_count_of(native), 1);
}

// ============================================================================
// Command Recording
// ============================================================================

/// A worker thread records a secondary into its own slot, inheriting the
/// render pass its parent began on the control thread.
#[rstest]
#[case::dummy_render_pass_objects(Backend::Dummy, false)]
#[case::dummy_dynamic_rendering(Backend::Dummy, true)]
#[case::vulkan_render_pass_objects(Backend::Vulkan, false)]
fn test_secondary_recorded_on_worker_thread(#[case] backend: Backend, #[case] dynamic: bool) {
    let config = DeviceConfig::new(2, 2).with_dynamic_render_paths(dynamic);
    let Some(mut ctx) = TestContext::with_config(backend, config) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let record_draw = ctx.dummy().is_some();

    let target = ctx.device.create_texture(&TextureDescriptor::new_2d(
        64,
        64,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT,
    ));
    assert!(target.is_valid());

    ctx.frames.new_frame();
    let slot = ctx.frames.current_frame_index();
    let primary = ctx.device.get_command_buffer(slot, 0, true);
    primary.begin_render_pass(
        &RenderPassDescriptor::new(vec![ColorAttachment::clear(
            AttachmentTarget::Texture(target.clone()),
            [0.0, 0.0, 0.0, 1.0],
        )])
        .with_secondary_contents(),
    );

    let device = &ctx.device;
    let parent = &primary;
    let secondary = std::thread::scope(|scope| {
        scope
            .spawn(move || {
                let secondary = device.get_command_buffer_secondary(slot, 1);
                secondary.begin_secondary(parent);
                if record_draw {
                    secondary.draw(0..3, 0..1);
                }
                secondary.end();
                secondary
            })
            .join()
            .unwrap()
    });
    assert_eq!(secondary.slot().thread, 1);
    assert_eq!(secondary.slot().frame, slot);
    assert!(secondary.is_ended());

    primary.execute_secondary(&[&*secondary]);
    primary.end_current_render_pass();
    primary.end();
    let primary_native = primary.native();
    ctx.frames.queue_command_buffer(primary);
    ctx.frames.present(None);
    ctx.frames.wait_idle();

    let Some(dummy) = ctx.dummy() else {
        return;
    };
    assert_eq!(
        dummy.commands(secondary.native()),
        vec![
            RecordedCommand::Begin { inherited: true },
            RecordedCommand::Draw {
                vertices: 0..3,
                instances: 0..1
            },
            RecordedCommand::End,
        ]
    );

    let commands = dummy.commands(primary_native);
    let position = |predicate: &dyn Fn(&RecordedCommand) -> bool| {
        commands
            .iter()
            .position(predicate)
            .unwrap_or_else(|| panic!("command missing from {:?}", commands))
    };
    let begin = if dynamic {
        position(&|c: &RecordedCommand| matches!(c, RecordedCommand::BeginRendering(_)))
    } else {
        position(&|c: &RecordedCommand| matches!(c, RecordedCommand::BeginRenderPass(_)))
    };
    let executed = RecordedCommand::ExecuteSecondary(vec![secondary.native()]);
    let execute = position(&|c: &RecordedCommand| *c == executed);
    let end = if dynamic {
        position(&|c: &RecordedCommand| *c == RecordedCommand::EndRendering)
    } else {
        position(&|c: &RecordedCommand| *c == RecordedCommand::EndRenderPass)
    };
    assert!(begin < execute && execute < end);
    assert_eq!(commands.last(), Some(&RecordedCommand::End));
    let other_path = commands.iter().any(|c| {
        if dynamic {
            matches!(c, RecordedCommand::BeginRenderPass(_))
        } else {
            matches!(c, RecordedCommand::BeginRendering(_))
        }
    });
    assert!(!other_path);
}

/// A secondary cannot inherit a pass whose body is recorded inline.
#[test]
fn test_begin_secondary_rejects_inline_render_pass() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    ctx.frames.new_frame();
    let backbuffer = ctx.frames.acquire_next_image().unwrap();
    let primary = ctx.device.get_command_buffer(0, 0, true);
    primary.begin_render_pass(&RenderPassDescriptor::new(vec![ColorAttachment::clear(
        AttachmentTarget::Backbuffer(backbuffer),
        [0.0, 0.0, 0.0, 1.0],
    )]));

    let secondary = ctx.device.get_command_buffer_secondary(0, 0);
    secondary.begin_secondary(&primary);
    assert!(!secondary.is_recording());
    assert!(dummy.commands(secondary.native()).is_empty());
}

/// Copy regions whose end overflows are rejected like any other
/// out-of-bounds region.
#[test]
fn test_copy_buffer_rejects_overflowing_region() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    let src = ctx.create_buffer(64, BufferUsage::COPY_SRC);
    let dst = ctx.create_buffer(64, BufferUsage::COPY_DST);

    ctx.frames.new_frame();
    let cb = ctx.device.get_command_buffer(0, 0, true);
    let overflowing = [
        BufferCopy {
            src_offset: u64::MAX,
            dst_offset: 0,
            size: 16,
        },
        BufferCopy {
            src_offset: 0,
            dst_offset: 8,
            size: u64::MAX,
        },
    ];
    for region in overflowing {
        cb.copy_buffer(&src, &dst, region);
    }
    let valid = BufferCopy {
        src_offset: 0,
        dst_offset: 32,
        size: 32,
    };
    cb.copy_buffer(&src, &dst, valid);

    let copies: Vec<_> = dummy
        .commands(cb.native())
        .into_iter()
        .filter(|c| matches!(c, RecordedCommand::CopyBuffer { .. }))
        .collect();
    assert_eq!(
        copies,
        vec![RecordedCommand::CopyBuffer {
            src: src.native(),
            dst: dst.native(),
            region: valid
        }]
    );
}

// ============================================================================
// Presentation
// ============================================================================

#[test]
fn test_present_uses_acquired_image() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    for expected in 0..4u32 {
        ctx.frames.new_frame();
        let backbuffer = ctx.frames.acquire_next_image().unwrap();
        assert_eq!(backbuffer.index(), expected % 3);

        let cb = ctx
            .device
            .get_command_buffer(ctx.frames.current_frame_index(), 0, true);
        cb.begin_render_pass(&RenderPassDescriptor::new(vec![ColorAttachment::clear(
            AttachmentTarget::Backbuffer(backbuffer.clone()),
            [0.0, 0.0, 0.0, 1.0],
        )]));
        cb.end_current_render_pass();
        cb.transition_backbuffer(&backbuffer, ResourceState::Present);
        cb.end();
        ctx.frames.queue_command_buffer(cb);
        ctx.frames.present(None);
        assert_eq!(backbuffer.state(), ResourceState::Present);
    }

    let presents = dummy.presents();
    assert_eq!(presents.len(), 4);
    assert_eq!(presents[3].1, 0);
    assert_eq!(ctx.frames.stats().frames_presented, 4);
}

/// A stale surface skips the frame, rebuilds the swapchain and keeps
/// in-flight resources alive.
#[test]
fn test_stale_surface_rebuilds_swapchain() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    let old_swapchain = ctx.frames.swapchain_info().unwrap().handle;

    dummy.set_auto_complete(false);
    let buffer = ctx.create_buffer(64, BufferUsage::VERTEX);
    let native = buffer.native();
    ctx.frames.new_frame();
    drop(buffer);
    ctx.frames.present(None);

    dummy.script_acquire(DriverStatus::OutOfDate);
    ctx.run_frame();
    assert!(ctx.frames.is_swapchain_stale());
    assert_eq!(ctx.frames.stats().stale_frames, 1);
    assert_eq!(ctx.frames.absolute_frame_index(), 2);
    assert_eq!(dummy.presents().len(), 1);
    assert_eq!(dummy.destroy_count_of(native), 0);

    ctx.run_frame();
    assert_eq!(dummy.swapchains_created(), 2);
    assert!(!ctx.frames.is_swapchain_stale());
    assert_eq!(ctx.frames.stats().swapchain_rebuilds, 1);
    assert_ne!(ctx.frames.swapchain_info().unwrap().handle, old_swapchain);
    // Frame 2 waited for frame 0, frame 2 itself is still on the GPU.
    assert_eq!(dummy.destroy_count_of(native), 1);
    assert_eq!(dummy.destroy_count_of(old_swapchain), 0);

    dummy.complete_all();
    ctx.run_frame();
    assert_eq!(dummy.destroy_count_of(old_swapchain), 1);
    assert_eq!(ctx.frames.absolute_frame_index(), 4);
    assert!(dummy.timeline_violations().is_empty());
}

#[test]
fn test_suboptimal_image_still_presented() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    dummy.script_acquire(DriverStatus::Suboptimal);
    ctx.run_frame();
    assert_eq!(dummy.presents().len(), 1);
    assert!(ctx.frames.is_swapchain_stale());

    ctx.run_frame();
    assert_eq!(dummy.swapchains_created(), 2);
    assert_eq!(dummy.presents().len(), 2);
}

#[test]
fn test_out_of_date_present_marks_stale() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    dummy.script_present(DriverStatus::OutOfDate);
    ctx.run_frame();
    assert!(ctx.frames.is_swapchain_stale());
    ctx.run_frame();
    assert_eq!(dummy.swapchains_created(), 2);
}

#[test]
fn test_resize_rebuilds_before_next_acquire() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();

    ctx.run_frame();
    dummy.set_surface_extent(redlilium_gpu::Extent2d::new(640, 480));
    ctx.frames.resize();
    assert!(ctx.frames.is_swapchain_stale());

    ctx.run_frame();
    assert_eq!(dummy.swapchains_created(), 2);
    assert_eq!(
        ctx.frames.swapchain_info().unwrap().extent,
        redlilium_gpu::Extent2d::new(640, 480)
    );
    assert_eq!(ctx.frames.stats().stale_frames, 0);
}

#[test]
#[should_panic(expected = "unrecoverable driver error")]
fn test_device_lost_on_present_is_fatal() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    ctx.dummy().unwrap().script_present(DriverStatus::DeviceLost);
    ctx.run_frame();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_drop_releases_everything() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let dummy = ctx.dummy().unwrap().clone();
    let TestContext {
        mut frames, device, ..
    } = ctx;

    let buffer = device.create_buffer(&redlilium_gpu::BufferDescriptor::new(
        32,
        BufferUsage::INDEX,
    ));
    let native = buffer.native();
    frames.new_frame();
    drop(buffer);
    drop(frames);

    assert_eq!(dummy.destroy_count_of(native), 1);
    assert_eq!(dummy.destroy_count(DummyObjectKind::Swapchain), 1);
    // Two timelines plus a binary pair per frame slot.
    assert_eq!(dummy.destroy_count(DummyObjectKind::Semaphore), 2 + 2 * 2);

    drop(device);
    assert_eq!(dummy.destroy_count(DummyObjectKind::CommandPool), 2 * 2);
}
