//! Frame pacing and submission ordering.
//!
//! [`FrameCoordinator`] lets the CPU run up to `max_frames_in_flight` frames
//! ahead of the GPU. Instead of one fence per frame it keeps two timeline
//! semaphores, one per queue, whose values only ever grow. Every frame
//! remembers the last graphics and compute values it signaled; reusing a
//! frame slot means waiting for those values.
//!
//! # Frame Overlap
//!
//! With 2 frames in flight:
//!
//! ```text
//! Frame 0: [new_frame] [record] [present: G=1] ─────────────────────────────►
//!                                [GPU frame 0] ─────────────────────────────►
//!
//! Frame 1:             [new_frame] [record] [present: G=2] ─────────────────►
//!                                            [GPU frame 1] ─────────────────►
//!
//! Frame 2:                         [new_frame: wait G>=1] [record] [present] ►
//!
//! Time ─────────────────────────────────────────────────────────────────────►
//! ```
//!
//! The first `max_frames_in_flight` frames use fresh slots and never wait.
//!
//! # Present
//!
//! ```text
//! acquire image ──(stale)──────────────────────────────────────────┐
//!      │ signals image_available[slot]                             │
//!      ▼                                                           │
//! graphics submit   waits: image_available, G(frame - (M-1)), C    │
//!      │            signals: G+1, render_complete[slot]            │
//!      ▼                                                           │
//! compute submit    waits: C          signals: C+1   (optional)    │
//!      │                                                           │
//!      ▼                                                           │
//! present           waits: render_complete[slot]                   │
//!      │                                                           │
//!      ▼                                                           ▼
//! record frame values, advance counters, flush retired deletions ◄─┘
//! ```
//!
//! A stale surface (out of date or suboptimal) is not an error: the frame's
//! queued work is dropped, the counters still advance and the swapchain is
//! rebuilt before the next acquire. Any other failing driver status from a
//! submit, present or wait is fatal.
//!
//! # Deferred Deletion
//!
//! Resources released during frame N are stamped N in the
//! [`DeletionQueue`](crate::DeletionQueue). They are destroyed once the GPU
//! reached the graphics and compute values recorded for frame N, checked
//! without blocking after every present and after every frame-slot wait.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use redlilium_gpu::{DeviceConfig, DummyDriver, FrameCoordinator, GraphicsDevice};
//!
//! let device = GraphicsDevice::new(Arc::new(DummyDriver::new()), DeviceConfig::default()).unwrap();
//! let mut frames = FrameCoordinator::new(device.clone()).unwrap();
//!
//! for _ in 0..4 {
//!     frames.new_frame();
//!     let slot = frames.current_frame_index();
//!     let cb = device.get_command_buffer(slot, 0, true);
//!     cb.end();
//!     frames.queue_command_buffer(cb);
//!     frames.present(None);
//! }
//! assert_eq!(frames.absolute_frame_index(), 4);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use crate::command::{CommandBuffer, TimestampSpan};
use crate::deletion::ResourceKind;
use crate::device::GraphicsDevice;
use crate::driver::{
    CommandBufferLevel, Driver, DriverStatus, NativeHandle, QueueKind, SemaphoreSignal, SemaphoreWait,
    SubmitInfo, SwapchainInfo, WaitStage,
};
use crate::error::{GraphicsError, fatal_driver_error};
use crate::pools::PoolSlot;
use crate::resources::ResourceStateCell;
use crate::types::{Extent2d, ResourceState, TextureFormat};

/// Frame counters, advanced once per [`FrameCoordinator::present`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    /// Frame slot, `absolute_frame_index % max_frames_in_flight`.
    pub current_frame_index: usize,
    /// Number of frames presented (or skipped) so far.
    pub absolute_frame_index: u64,
    /// Last value signaled on the graphics timeline.
    pub graphics_timeline_value: u64,
    /// Last value signaled on the compute timeline.
    pub compute_timeline_value: u64,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames whose image reached `present`.
    pub frames_presented: u64,
    /// Frames skipped because the surface was stale.
    pub stale_frames: u64,
    /// Swapchains rebuilt.
    pub swapchain_rebuilds: u64,
    /// CPU waits for a frame slot.
    pub cpu_waits: u64,
    /// Queue submissions.
    pub submissions: u64,
    /// Native objects destroyed by the deletion queue.
    pub objects_destroyed: u64,
}

/// Timestamps one primary command buffer wrote, read back after its frame
/// retired.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuTimestamps {
    /// Absolute frame the buffer was submitted in.
    pub frame: u64,
    /// Pool slot of the buffer.
    pub slot: PoolSlot,
    /// Index of the buffer within its slot.
    pub buffer_index: u32,
    /// Raw timestamp ticks, in write order.
    pub ticks: Vec<u64>,
    /// Nanoseconds per tick.
    pub period_ns: f32,
}

impl GpuTimestamps {
    /// Time between the first and the last timestamp, in nanoseconds.
    pub fn elapsed_ns(&self) -> f64 {
        match (self.ticks.first(), self.ticks.last()) {
            (Some(first), Some(last)) => last.saturating_sub(*first) as f64 * self.period_ns as f64,
            _ => 0.0,
        }
    }
}

/// The swapchain image acquired for the current frame.
#[derive(Debug, Clone)]
pub struct Backbuffer {
    index: u32,
    format: TextureFormat,
    extent: Extent2d,
    state: Arc<ResourceStateCell>,
}

impl Backbuffer {
    /// Swapchain image index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Image format.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Image size.
    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    /// Last recorded usage state of the image.
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &ResourceStateCell {
        &self.state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameRecord {
    frame: u64,
    graphics_value: u64,
    compute_value: u64,
}

#[derive(Debug)]
struct FrameSlot {
    image_available: NativeHandle,
    render_complete: NativeHandle,
    /// Values of the last frame that used this slot.
    last: Option<FrameRecord>,
    timestamps: Vec<(PoolSlot, u32, TimestampSpan)>,
}

#[derive(Debug)]
struct SwapchainState {
    info: SwapchainInfo,
    stale: bool,
    image_states: Vec<Arc<ResourceStateCell>>,
}

impl SwapchainState {
    fn new(info: SwapchainInfo) -> Self {
        let image_states = (0..info.image_count)
            .map(|_| Arc::new(ResourceStateCell::new(ResourceState::Undefined)))
            .collect();
        Self {
            info,
            stale: false,
            image_states,
        }
    }
}

/// Orders submissions and presentation across frames and queues.
///
/// Owned by the control thread; workers record through the shared
/// [`GraphicsDevice`].
pub struct FrameCoordinator {
    device: Arc<GraphicsDevice>,
    driver: Arc<dyn Driver>,
    max_frames_in_flight: usize,
    counters: FrameCounters,
    graphics_timeline: NativeHandle,
    compute_timeline: NativeHandle,
    slots: Vec<FrameSlot>,
    /// Records of the last `max_frames_in_flight` frames.
    history: VecDeque<FrameRecord>,
    /// Frames whose deletions have not been flushed yet.
    pending_frames: VecDeque<FrameRecord>,
    swapchain: Option<SwapchainState>,
    backbuffer: Option<Backbuffer>,
    queued: Vec<Arc<CommandBuffer>>,
    frame_timestamps: Vec<(PoolSlot, u32, TimestampSpan)>,
    frame_open: bool,
    /// The acquired image's semaphore has not been waited on yet.
    image_wait_pending: bool,
    /// The wait on an earlier frame's graphics value has not been attached yet.
    prior_frame_wait_pending: bool,
    stats: FrameStats,
    last_gpu_timings: Vec<GpuTimestamps>,
}

impl FrameCoordinator {
    /// Create the timeline semaphores, the per-slot binary semaphores and,
    /// if the driver has a surface, the swapchain.
    pub fn new(device: Arc<GraphicsDevice>) -> Result<Self, GraphicsError> {
        let driver = device.driver().clone();
        let max_frames_in_flight = device.config().max_frames_in_flight;

        let mut created = Vec::new();
        let mut create_objects = || -> Result<_, GraphicsError> {
            let graphics = driver.create_timeline_semaphore(0)?;
            created.push(graphics);
            let compute = driver.create_timeline_semaphore(0)?;
            created.push(compute);

            let mut slots = Vec::with_capacity(max_frames_in_flight);
            for _ in 0..max_frames_in_flight {
                let image_available = driver.create_binary_semaphore()?;
                created.push(image_available);
                let render_complete = driver.create_binary_semaphore()?;
                created.push(render_complete);
                slots.push(FrameSlot {
                    image_available,
                    render_complete,
                    last: None,
                    timestamps: Vec::new(),
                });
            }

            let swapchain = if driver.has_surface() {
                let info = driver.create_swapchain(None)?;
                log::info!(
                    "FrameCoordinator: created swapchain {} ({} images, {}x{}, {:?})",
                    info.handle,
                    info.image_count,
                    info.extent.width,
                    info.extent.height,
                    info.format
                );
                Some(SwapchainState::new(info))
            } else {
                log::info!("FrameCoordinator: no surface, running headless");
                None
            };
            Ok((graphics, compute, slots, swapchain))
        };

        let (graphics_timeline, compute_timeline, slots, swapchain) = match create_objects() {
            Ok(objects) => objects,
            Err(e) => {
                for semaphore in created {
                    driver.destroy_semaphore(semaphore);
                }
                return Err(e);
            }
        };

        log::debug!(
            "FrameCoordinator: {} frames in flight on {} driver",
            max_frames_in_flight,
            driver.name()
        );

        Ok(Self {
            device,
            driver,
            max_frames_in_flight,
            counters: FrameCounters::default(),
            graphics_timeline,
            compute_timeline,
            slots,
            history: VecDeque::with_capacity(max_frames_in_flight),
            pending_frames: VecDeque::new(),
            swapchain,
            backbuffer: None,
            queued: Vec::new(),
            frame_timestamps: Vec::new(),
            frame_open: false,
            image_wait_pending: false,
            prior_frame_wait_pending: false,
            stats: FrameStats::default(),
            last_gpu_timings: Vec::new(),
        })
    }

    /// The device frames are recorded on.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Current counters.
    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Frame slot of the current frame.
    pub fn current_frame_index(&self) -> usize {
        self.counters.current_frame_index
    }

    /// Absolute index of the current frame.
    pub fn absolute_frame_index(&self) -> u64 {
        self.counters.absolute_frame_index
    }

    /// Number of frame slots.
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The graphics timeline semaphore.
    pub fn graphics_timeline(&self) -> NativeHandle {
        self.graphics_timeline
    }

    /// The compute timeline semaphore.
    pub fn compute_timeline(&self) -> NativeHandle {
        self.compute_timeline
    }

    /// Timestamps read back for the frame slot reused by the last
    /// [`new_frame`](Self::new_frame).
    pub fn last_gpu_timings(&self) -> &[GpuTimestamps] {
        &self.last_gpu_timings
    }

    /// Whether the swapchain will be rebuilt before the next acquire.
    pub fn is_swapchain_stale(&self) -> bool {
        self.swapchain.as_ref().is_some_and(|s| s.stale)
    }

    /// Current swapchain, if a surface is attached.
    pub fn swapchain_info(&self) -> Option<&SwapchainInfo> {
        self.swapchain.as_ref().map(|s| &s.info)
    }

    /// Whether `new_frame` ran and `present` has not yet.
    pub fn is_frame_open(&self) -> bool {
        self.frame_open
    }

    /// Number of frames whose deletions are still held back.
    pub fn frames_pending_retirement(&self) -> usize {
        self.pending_frames.len()
    }

    // ---- Frame lifecycle --------------------------------------------------

    /// Start a frame.
    ///
    /// Once every slot has been used, waits on the CPU until the GPU
    /// finished the frame that last used the current slot. Then resets the
    /// slot's pools, flushes retired deletions, applies queued descriptor
    /// updates and recycles dead resource slots.
    pub fn new_frame(&mut self) {
        crate::profile_function!();

        if self.frame_open {
            log::warn!(
                "FrameCoordinator: new_frame called twice for frame {}, ignored",
                self.counters.absolute_frame_index
            );
            return;
        }

        let slot = self.counters.current_frame_index;
        let reused = self.counters.absolute_frame_index >= self.max_frames_in_flight as u64;
        if reused && let Some(record) = self.slots[slot].last {
            {
                crate::profile_scope!("wait_frame_slot");
                log::trace!(
                    "FrameCoordinator: frame {} waits for frame {} (graphics {}, compute {})",
                    self.counters.absolute_frame_index,
                    record.frame,
                    record.graphics_value,
                    record.compute_value
                );
                self.wait_timeline(self.graphics_timeline, record.graphics_value);
                self.wait_timeline(self.compute_timeline, record.compute_value);
                self.stats.cpu_waits += 1;
            }
            self.read_timestamps(slot, record.frame);
        }

        self.device.command_buffers().reset_frame(slot);
        self.collect_retired();
        self.device.apply_descriptor_updates();
        self.device.cleanup_dead_resources();

        log::trace!(
            "FrameCoordinator: begin frame {} (slot {})",
            self.counters.absolute_frame_index,
            slot
        );
        self.frame_open = true;
        self.prior_frame_wait_pending = true;
    }

    /// Acquire this frame's swapchain image.
    ///
    /// Rebuilds a stale swapchain first. Returns `None` when headless or when
    /// the surface is stale; the frame is then skipped by
    /// [`present`](Self::present).
    pub fn acquire_next_image(&mut self) -> Option<Backbuffer> {
        if !self.frame_open {
            log::warn!("FrameCoordinator: acquire_next_image outside a frame, starting one");
            self.new_frame();
        }
        if let Some(backbuffer) = &self.backbuffer {
            return Some(backbuffer.clone());
        }
        if self.swapchain.as_ref()?.stale {
            self.rebuild_swapchain();
        }

        let swapchain = self.swapchain.as_mut()?;
        if swapchain.stale {
            return None;
        }

        let signal = self.slots[self.counters.current_frame_index].image_available;
        match self.driver.acquire_next_image(swapchain.info.handle, signal) {
            Ok(image) => {
                if image.suboptimal {
                    log::debug!("FrameCoordinator: suboptimal swapchain, rebuilding next frame");
                    swapchain.stale = true;
                }
                let Some(state) = swapchain.image_states.get(image.index as usize) else {
                    log::error!(
                        "FrameCoordinator: driver acquired image {} of {}",
                        image.index,
                        swapchain.info.image_count
                    );
                    panic!("swapchain image index out of range");
                };
                let backbuffer = Backbuffer {
                    index: image.index,
                    format: swapchain.info.format,
                    extent: swapchain.info.extent,
                    state: state.clone(),
                };
                self.backbuffer = Some(backbuffer.clone());
                self.image_wait_pending = true;
                Some(backbuffer)
            }
            Err(status) if status.is_stale_surface() => {
                log::warn!(
                    "FrameCoordinator: acquire returned {}, skipping frame {}",
                    status,
                    self.counters.absolute_frame_index
                );
                swapchain.stale = true;
                None
            }
            Err(status) => fatal_driver_error("FrameCoordinator: acquire_next_image", status),
        }
    }

    /// Queue a recorded primary graphics command buffer of the current frame
    /// slot for the next graphics submission.
    pub fn queue_command_buffer(&mut self, command_buffer: Arc<CommandBuffer>) {
        if command_buffer.level() != CommandBufferLevel::Primary
            || command_buffer.queue() != QueueKind::Graphics
        {
            log::warn!(
                "FrameCoordinator: only primary graphics buffers can be queued, {} ignored",
                command_buffer.native()
            );
            return;
        }
        if command_buffer.slot().frame != self.counters.current_frame_index {
            log::warn!(
                "FrameCoordinator: buffer {} belongs to frame slot {}, current slot is {}, ignored",
                command_buffer.native(),
                command_buffer.slot().frame,
                self.counters.current_frame_index
            );
            return;
        }
        self.queued.push(command_buffer);
    }

    /// Number of buffers waiting for submission.
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    /// Submit the queued buffers now instead of at `present`.
    ///
    /// The first graphics submission of a frame carries the waits on the
    /// acquired image and on the earlier frame's graphics value; every
    /// submission waits on the last compute value.
    pub fn submit_queued_command_buffers(&mut self) {
        if self.queued.is_empty() {
            return;
        }
        let waits = self.take_frame_waits();
        self.submit_graphics(waits, None);
    }

    /// Submit a compute buffer on the compute queue.
    ///
    /// Waits on the last graphics value and the previous compute value, and
    /// signals the next compute value.
    pub fn submit_compute_command_buffer(&mut self, command_buffer: Arc<CommandBuffer>) {
        let mut waits = Vec::new();
        if self.counters.graphics_timeline_value > 0 {
            waits.push(SemaphoreWait {
                semaphore: self.graphics_timeline,
                value: self.counters.graphics_timeline_value,
                stage: WaitStage::ComputeShader,
            });
        }
        self.submit_compute(&command_buffer, waits);
    }

    /// Submit the frame, present it and advance to the next frame.
    ///
    /// `async_compute` runs on the compute queue chained only to earlier
    /// compute work, overlapping this frame's graphics work.
    pub fn present(&mut self, async_compute: Option<Arc<CommandBuffer>>) {
        crate::profile_function!();

        if !self.frame_open {
            log::warn!("FrameCoordinator: present without new_frame, starting one");
            self.new_frame();
        }

        let headless = self.swapchain.is_none();
        let backbuffer = if headless {
            None
        } else {
            self.acquire_next_image()
        };

        if !headless && backbuffer.is_none() {
            if !self.queued.is_empty() || async_compute.is_some() {
                log::warn!(
                    "FrameCoordinator: dropping {} queued buffers of skipped frame {}",
                    self.queued.len() + usize::from(async_compute.is_some()),
                    self.counters.absolute_frame_index
                );
            }
            self.queued.clear();
            self.stats.stale_frames += 1;
            self.end_frame();
            return;
        }

        let render_complete = self.slots[self.counters.current_frame_index].render_complete;
        let waits = self.take_frame_waits();
        self.submit_graphics(waits, backbuffer.as_ref().map(|_| render_complete));

        if let Some(command_buffer) = async_compute {
            self.submit_compute(&command_buffer, Vec::new());
        }

        if let Some(backbuffer) = backbuffer {
            self.present_image(&backbuffer, render_complete);
        }
        self.stats.frames_presented += 1;
        self.end_frame();
    }

    /// Rebuild the swapchain before the next acquire.
    pub fn resize(&mut self) {
        match &mut self.swapchain {
            Some(swapchain) => {
                log::debug!("FrameCoordinator: resize requested, swapchain marked stale");
                swapchain.stale = true;
            }
            None => log::debug!("FrameCoordinator: resize ignored, no surface"),
        }
    }

    /// Block until the GPU is idle and flush the deletion queue.
    ///
    /// Everything is flushed, including resources released during the open
    /// frame, unless buffers are still queued for submission; then only
    /// retired frames are flushed.
    pub fn wait_idle(&mut self) {
        let status = self.driver.wait_idle();
        if !status.is_success() {
            fatal_driver_error("FrameCoordinator: wait_idle", status);
        }
        self.collect_retired();
        if !self.queued.is_empty() {
            log::debug!(
                "FrameCoordinator: {} buffers still queued, open frame deletions kept",
                self.queued.len()
            );
            return;
        }
        let destroyed = self.device.deletion_queue().flush(self.driver.as_ref());
        if destroyed > 0 {
            log::debug!("FrameCoordinator: wait_idle flushed {} objects", destroyed);
        }
        self.stats.objects_destroyed += destroyed as u64;
    }

    // ---- Internals --------------------------------------------------------

    /// Graphics value signaled by frame `absolute - (max_frames_in_flight - 1)`
    /// once every slot has been used.
    fn previous_frame_graphics_value(&self) -> Option<u64> {
        let absolute = self.counters.absolute_frame_index;
        let frames = self.max_frames_in_flight as u64;
        if absolute < frames {
            return None;
        }
        let target = absolute - (frames - 1);
        self.history
            .iter()
            .find(|record| record.frame == target)
            .map(|record| record.graphics_value)
            .filter(|&value| value > 0)
    }

    /// Waits for the next graphics submission of this frame. The image and
    /// prior-frame waits are handed out once.
    fn take_frame_waits(&mut self) -> Vec<SemaphoreWait> {
        let mut waits = Vec::new();
        if std::mem::take(&mut self.image_wait_pending) {
            waits.push(SemaphoreWait {
                semaphore: self.slots[self.counters.current_frame_index].image_available,
                value: 0,
                stage: WaitStage::ColorOutput,
            });
        }
        if std::mem::take(&mut self.prior_frame_wait_pending)
            && let Some(value) = self.previous_frame_graphics_value()
        {
            waits.push(SemaphoreWait {
                semaphore: self.graphics_timeline,
                value,
                stage: WaitStage::AllCommands,
            });
        }
        waits.extend(self.compute_wait());
        waits
    }

    fn compute_wait(&self) -> Option<SemaphoreWait> {
        (self.counters.compute_timeline_value > 0).then(|| SemaphoreWait {
            semaphore: self.compute_timeline,
            value: self.counters.compute_timeline_value,
            stage: WaitStage::AllCommands,
        })
    }

    fn wait_timeline(&self, semaphore: NativeHandle, value: u64) {
        if value == 0 {
            return;
        }
        let status = self.driver.wait_timeline(semaphore, value);
        if !status.is_success() {
            fatal_driver_error("FrameCoordinator: wait_timeline", status);
        }
    }

    fn finalize(&mut self, command_buffer: &CommandBuffer) -> bool {
        if !command_buffer.finalize() {
            return false;
        }
        if let Some(span) = command_buffer.timestamp_span() {
            self.frame_timestamps
                .push((command_buffer.slot(), command_buffer.index(), span));
        }
        true
    }

    fn submit_graphics(&mut self, waits: Vec<SemaphoreWait>, render_complete: Option<NativeHandle>) {
        let queued = std::mem::take(&mut self.queued);
        let mut command_buffers = Vec::with_capacity(queued.len());
        for command_buffer in &queued {
            if self.finalize(command_buffer) {
                command_buffers.push(command_buffer.native());
            }
        }

        let value = self.counters.graphics_timeline_value + 1;
        let mut signals = vec![SemaphoreSignal {
            semaphore: self.graphics_timeline,
            value,
        }];
        if let Some(semaphore) = render_complete {
            signals.push(SemaphoreSignal { semaphore, value: 0 });
        }

        let info = SubmitInfo {
            command_buffers,
            waits,
            signals,
        };
        let status = self.driver.submit(QueueKind::Graphics, &info);
        if !status.is_success() {
            fatal_driver_error("FrameCoordinator: graphics submit", status);
        }
        log::trace!(
            "FrameCoordinator: graphics submit of {} buffers signals {}",
            info.command_buffers.len(),
            value
        );
        self.counters.graphics_timeline_value = value;
        self.stats.submissions += 1;
    }

    fn submit_compute(&mut self, command_buffer: &CommandBuffer, mut waits: Vec<SemaphoreWait>) {
        if command_buffer.queue() != QueueKind::Compute {
            log::warn!(
                "FrameCoordinator: {} is not a compute buffer, not submitted",
                command_buffer.native()
            );
            return;
        }
        if !self.finalize(command_buffer) {
            return;
        }

        if self.counters.compute_timeline_value > 0 {
            waits.push(SemaphoreWait {
                semaphore: self.compute_timeline,
                value: self.counters.compute_timeline_value,
                stage: WaitStage::ComputeShader,
            });
        }
        let value = self.counters.compute_timeline_value + 1;
        let info = SubmitInfo {
            command_buffers: vec![command_buffer.native()],
            waits,
            signals: vec![SemaphoreSignal {
                semaphore: self.compute_timeline,
                value,
            }],
        };
        let status = self.driver.submit(QueueKind::Compute, &info);
        if !status.is_success() {
            fatal_driver_error("FrameCoordinator: compute submit", status);
        }
        log::trace!("FrameCoordinator: compute submit signals {}", value);
        self.counters.compute_timeline_value = value;
        self.stats.submissions += 1;
    }

    fn present_image(&mut self, backbuffer: &Backbuffer, wait: NativeHandle) {
        let Some(swapchain) = self.swapchain.as_mut() else {
            return;
        };
        let status = self.driver.present(swapchain.info.handle, backbuffer.index, wait);
        match status {
            DriverStatus::Success => {}
            status if status.is_stale_surface() => {
                log::debug!("FrameCoordinator: present returned {}, rebuilding swapchain", status);
                swapchain.stale = true;
            }
            status => fatal_driver_error("FrameCoordinator: present", status),
        }
    }

    fn rebuild_swapchain(&mut self) {
        let Some(swapchain) = self.swapchain.as_mut() else {
            return;
        };
        let old = swapchain.info.handle;
        match self.driver.create_swapchain(Some(old)) {
            Ok(info) => {
                log::info!(
                    "FrameCoordinator: rebuilt swapchain {} -> {} ({}x{})",
                    old,
                    info.handle,
                    info.extent.width,
                    info.extent.height
                );
                *swapchain = SwapchainState::new(info);
                // Presents of earlier frames may still use the old swapchain.
                self.device
                    .deletion_queue()
                    .enqueue(ResourceKind::Swapchain, old, None);
                self.stats.swapchain_rebuilds += 1;
            }
            Err(e) => {
                log::warn!("FrameCoordinator: swapchain rebuild failed, retrying next frame: {}", e);
            }
        }
    }

    fn read_timestamps(&mut self, slot: usize, frame: u64) {
        let spans = std::mem::take(&mut self.slots[slot].timestamps);
        self.last_gpu_timings.clear();
        let period_ns = self.driver.timestamp_period();
        for (pool_slot, buffer_index, span) in spans {
            match self.driver.query_results(span.pool, span.first, span.count) {
                Ok(ticks) => self.last_gpu_timings.push(GpuTimestamps {
                    frame,
                    slot: pool_slot,
                    buffer_index,
                    ticks,
                    period_ns,
                }),
                Err(status) => log::warn!(
                    "FrameCoordinator: timestamp readback for frame {} failed: {}",
                    frame,
                    status
                ),
            }
        }
    }

    /// Record the frame, advance the counters and flush what retired.
    fn end_frame(&mut self) {
        let record = FrameRecord {
            frame: self.counters.absolute_frame_index,
            graphics_value: self.counters.graphics_timeline_value,
            compute_value: self.counters.compute_timeline_value,
        };
        let slot = &mut self.slots[self.counters.current_frame_index];
        slot.last = Some(record);
        slot.timestamps = std::mem::take(&mut self.frame_timestamps);

        if self.history.len() == self.max_frames_in_flight {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.pending_frames.push_back(record);

        self.counters.absolute_frame_index += 1;
        self.counters.current_frame_index =
            (self.counters.current_frame_index + 1) % self.max_frames_in_flight;
        self.device
            .deletion_queue()
            .set_current_frame(self.counters.absolute_frame_index);
        self.backbuffer = None;
        self.frame_open = false;
        self.image_wait_pending = false;
        self.prior_frame_wait_pending = false;

        self.collect_retired();

        crate::frame_mark!();
        crate::profile_plot!("frames_pending_retirement", self.pending_frames.len());
        crate::profile_plot!(
            "pending_deletions",
            self.device.deletion_queue().pending_count()
        );
    }

    /// Flush deletions of every frame whose timeline values the GPU reached.
    fn collect_retired(&mut self) {
        if self.pending_frames.is_empty() {
            return;
        }
        let graphics = self.completed_value(self.graphics_timeline);
        let compute = self.completed_value(self.compute_timeline);

        let mut retired = None;
        while self.pending_frames.front().is_some_and(|record| {
            record.graphics_value <= graphics && record.compute_value <= compute
        }) {
            retired = self.pending_frames.pop_front().map(|record| record.frame);
        }

        if let Some(frame) = retired {
            let destroyed = self
                .device
                .deletion_queue()
                .flush_retired(self.driver.as_ref(), frame);
            self.stats.objects_destroyed += destroyed as u64;
        }
    }

    fn completed_value(&self, semaphore: NativeHandle) -> u64 {
        match self.driver.timeline_value(semaphore) {
            Ok(value) => value,
            Err(status) => fatal_driver_error("FrameCoordinator: timeline_value", status),
        }
    }
}

impl Drop for FrameCoordinator {
    fn drop(&mut self) {
        let status = self.driver.wait_idle();
        if !status.is_success() {
            log::error!("FrameCoordinator: wait_idle failed during shutdown: {}", status);
        }
        self.queued.clear();
        self.backbuffer = None;

        let destroyed = self.device.deletion_queue().flush(self.driver.as_ref());
        if let Some(swapchain) = self.swapchain.take() {
            self.driver.destroy_swapchain(swapchain.info.handle);
        }
        for slot in &self.slots {
            self.driver.destroy_semaphore(slot.image_available);
            self.driver.destroy_semaphore(slot.render_complete);
        }
        self.driver.destroy_semaphore(self.graphics_timeline);
        self.driver.destroy_semaphore(self.compute_timeline);
        log::debug!(
            "FrameCoordinator: shut down after {} frames, {} objects flushed",
            self.counters.absolute_frame_index,
            destroyed
        );
    }
}

impl std::fmt::Debug for FrameCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCoordinator")
            .field("counters", &self.counters)
            .field("max_frames_in_flight", &self.max_frames_in_flight)
            .field("frame_open", &self.frame_open)
            .field("queued", &self.queued.len())
            .field("stale", &self.is_swapchain_stale())
            .finish()
    }
}

static_assertions::assert_impl_all!(FrameCoordinator: Send);
static_assertions::assert_impl_all!(Backbuffer: Send, Sync);
