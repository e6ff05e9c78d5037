//! Dummy driver for testing and development.
//!
//! This driver doesn't touch a GPU. It hands out unique handles, keeps
//! timeline semaphore values, and records every call that matters to the
//! frame machinery (submissions, CPU waits, destroys, recorded commands)
//! so tests can assert on them.
//!
//! GPU progress is simulated. In the default auto-complete mode a
//! submission finishes the moment it is submitted. With
//! [`DummyDriver::set_auto_complete`] turned off, signaled timeline values
//! stay pending until [`DummyDriver::complete_all`] or a CPU wait on the
//! value.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::pipeline_cache::DeviceIdentity;
use crate::types::{
    BufferDescriptor, DescriptorSetDescriptor, Extent2d, IndexFormat, PipelineDescriptor,
    SamplerDescriptor, TextureDescriptor, TextureFormat,
};

use super::{
    AcquiredImage, AllocationToken, Barrier, BufferCopy, BufferTextureCopy, CommandBufferLevel,
    Driver, DriverStatus, InheritanceInfo, NativeDescriptorWrite, NativeHandle, NativeTarget,
    QueryKind, QueueKind, RenderPassObjects, RenderingInfo, SubmitInfo, SwapchainInfo,
};

/// Number of images in a dummy swapchain.
pub const DUMMY_SWAPCHAIN_IMAGES: u32 = 3;

/// Ticks between two consecutive dummy timestamp queries.
pub const DUMMY_TIMESTAMP_STEP: u64 = 1000;

/// Kind of object a destroy call released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DummyObjectKind {
    /// Buffer.
    Buffer,
    /// Texture.
    Texture,
    /// Sampler.
    Sampler,
    /// Pipeline.
    Pipeline,
    /// Descriptor set.
    DescriptorSet,
    /// Swapchain.
    Swapchain,
    /// Command pool.
    CommandPool,
    /// Query pool.
    QueryPool,
    /// Semaphore.
    Semaphore,
}

/// A command recorded into a dummy command buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// `begin_command_buffer`, with whether inheritance was given.
    Begin {
        /// Secondary inheritance info was passed.
        inherited: bool,
    },
    /// `end_command_buffer`.
    End,
    /// Query range reset.
    ResetQueries {
        /// Query pool.
        pool: NativeHandle,
        /// First query.
        first: u32,
        /// Number of queries.
        count: u32,
    },
    /// Query opened.
    BeginQuery(NativeHandle, u32),
    /// Query closed.
    EndQuery(NativeHandle, u32),
    /// Timestamp written.
    WriteTimestamp(NativeHandle, u32),
    /// Dynamic rendering begun.
    BeginRendering(RenderingInfo),
    /// Dynamic rendering ended.
    EndRendering,
    /// Object-based render pass begun.
    BeginRenderPass(RenderPassObjects),
    /// Object-based render pass ended.
    EndRenderPass,
    /// Pipeline bound.
    BindPipeline(NativeHandle),
    /// Descriptor set bound.
    BindDescriptorSet {
        /// Set index.
        index: u32,
        /// The set.
        set: NativeHandle,
    },
    /// Vertex buffer bound.
    BindVertexBuffer {
        /// Binding slot.
        slot: u32,
        /// The buffer.
        buffer: NativeHandle,
    },
    /// Index buffer bound.
    BindIndexBuffer {
        /// The buffer.
        buffer: NativeHandle,
        /// Index type.
        format: IndexFormat,
    },
    /// Non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Compute dispatch.
    Dispatch(u32, u32, u32),
    /// Buffer copy.
    CopyBuffer {
        /// Source.
        src: NativeHandle,
        /// Destination.
        dst: NativeHandle,
        /// Region.
        region: BufferCopy,
    },
    /// Buffer-to-texture copy.
    CopyBufferToTexture {
        /// Source.
        src: NativeHandle,
        /// Destination.
        dst: NativeHandle,
    },
    /// Transition barriers.
    Barriers(Vec<Barrier>),
    /// Secondaries executed.
    ExecuteSecondary(Vec<NativeHandle>),
}

/// A submission seen by the dummy driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Target queue.
    pub queue: QueueKind,
    /// What was submitted.
    pub info: SubmitInfo,
}

#[derive(Debug, Default, Clone, Copy)]
struct Timeline {
    /// Value the simulated GPU has reached.
    completed: u64,
    /// Highest value any submission signals.
    pending: u64,
}

type RenderPassKey = (Vec<TextureFormat>, Option<TextureFormat>, Vec<NativeTarget>);

#[derive(Debug, Default)]
struct DummyState {
    timelines: HashMap<NativeHandle, Timeline>,
    binary_semaphores: HashSet<NativeHandle>,
    query_pools: HashMap<NativeHandle, (QueryKind, u32)>,
    command_pools: HashMap<NativeHandle, QueueKind>,
    commands: HashMap<NativeHandle, Vec<RecordedCommand>>,
    render_passes: HashMap<RenderPassKey, RenderPassObjects>,
    submissions: Vec<SubmissionRecord>,
    cpu_waits: Vec<(NativeHandle, u64)>,
    destroyed: Vec<(DummyObjectKind, NativeHandle)>,
    pool_resets: Vec<NativeHandle>,
    descriptor_writes: Vec<(NativeHandle, Vec<NativeDescriptorWrite>)>,
    acquire_script: VecDeque<DriverStatus>,
    present_script: VecDeque<DriverStatus>,
    presents: Vec<(NativeHandle, u32)>,
    swapchains_created: usize,
    next_image: u32,
    surface_extent: Extent2d,
    pipeline_cache: Vec<u8>,
    timeline_violations: Vec<String>,
}

/// Dummy driver.
#[derive(Debug)]
pub struct DummyDriver {
    next_handle: AtomicU64,
    has_surface: bool,
    auto_complete: AtomicBool,
    fail_next_create: AtomicBool,
    state: Mutex<DummyState>,
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyDriver {
    /// Identity reported by every dummy driver.
    pub const IDENTITY: DeviceIdentity = DeviceIdentity {
        vendor_id: 0xffff,
        device_id: 0x0001,
        cache_uuid: *b"redlilium-dummy!",
    };

    /// Create a dummy driver with a simulated 1280x720 presentation surface.
    pub fn new() -> Self {
        Self::with_surface(true)
    }

    /// Create a dummy driver without a presentation surface.
    pub fn headless() -> Self {
        Self::with_surface(false)
    }

    fn with_surface(has_surface: bool) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            has_surface,
            auto_complete: AtomicBool::new(true),
            fail_next_create: AtomicBool::new(false),
            state: Mutex::new(DummyState {
                surface_extent: Extent2d::new(1280, 720),
                ..Default::default()
            }),
        }
    }

    fn allocate_handle(&self) -> NativeHandle {
        NativeHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn check_scripted_failure(&self, what: &str) -> Result<(), GraphicsError> {
        if self.fail_next_create.swap(false, Ordering::AcqRel) {
            log::trace!("DummyDriver: failing {} creation as scripted", what);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "dummy driver refused {what}"
            )));
        }
        Ok(())
    }

    fn record(&self, command_buffer: NativeHandle, command: RecordedCommand) {
        self.state
            .lock()
            .commands
            .entry(command_buffer)
            .or_default()
            .push(command);
    }

    fn destroyed(&self, kind: DummyObjectKind, handle: NativeHandle) {
        log::trace!("DummyDriver: destroying {:?} {}", kind, handle);
        self.state.lock().destroyed.push((kind, handle));
    }

    // ---- Scripting --------------------------------------------------------

    /// Complete submissions as soon as they are submitted (default), or keep
    /// them pending until completed explicitly.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.auto_complete.store(enabled, Ordering::Release);
    }

    /// Let the simulated GPU finish everything submitted so far.
    pub fn complete_all(&self) {
        for timeline in self.state.lock().timelines.values_mut() {
            timeline.completed = timeline.pending;
        }
    }

    /// Let the simulated GPU reach `value` on one timeline.
    pub fn complete_timeline(&self, semaphore: NativeHandle, value: u64) {
        if let Some(timeline) = self.state.lock().timelines.get_mut(&semaphore) {
            timeline.completed = timeline.completed.max(value.min(timeline.pending));
        }
    }

    /// Make the next resource creation fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::Release);
    }

    /// Queue a result for a future `acquire_next_image` call.
    ///
    /// `Success` and `Suboptimal` hand out an image, anything else fails.
    pub fn script_acquire(&self, status: DriverStatus) {
        self.state.lock().acquire_script.push_back(status);
    }

    /// Queue a result for a future `present` call.
    pub fn script_present(&self, status: DriverStatus) {
        self.state.lock().present_script.push_back(status);
    }

    /// Change the size swapchains are created with.
    pub fn set_surface_extent(&self, extent: Extent2d) {
        self.state.lock().surface_extent = extent;
    }

    // ---- Inspection -------------------------------------------------------

    /// Every submission so far, in order.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    /// Every CPU timeline wait so far, as `(semaphore, value)`.
    pub fn cpu_waits(&self) -> Vec<(NativeHandle, u64)> {
        self.state.lock().cpu_waits.clone()
    }

    /// Every destroy call so far.
    pub fn destroyed_objects(&self) -> Vec<(DummyObjectKind, NativeHandle)> {
        self.state.lock().destroyed.clone()
    }

    /// Number of destroy calls for objects of `kind`.
    pub fn destroy_count(&self, kind: DummyObjectKind) -> usize {
        self.state
            .lock()
            .destroyed
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Number of destroy calls that released `handle`.
    pub fn destroy_count_of(&self, handle: NativeHandle) -> usize {
        self.state
            .lock()
            .destroyed
            .iter()
            .filter(|(_, h)| *h == handle)
            .count()
    }

    /// Commands recorded into a command buffer since its last begin.
    pub fn commands(&self, command_buffer: NativeHandle) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .commands
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default()
    }

    /// Command pool resets so far, in order.
    pub fn pool_resets(&self) -> Vec<NativeHandle> {
        self.state.lock().pool_resets.clone()
    }

    /// Descriptor writes applied so far.
    pub fn descriptor_writes(&self) -> Vec<(NativeHandle, Vec<NativeDescriptorWrite>)> {
        self.state.lock().descriptor_writes.clone()
    }

    /// Successful presents so far, as `(swapchain, image)`.
    pub fn presents(&self) -> Vec<(NativeHandle, u32)> {
        self.state.lock().presents.clone()
    }

    /// Number of swapchains created.
    pub fn swapchains_created(&self) -> usize {
        self.state.lock().swapchains_created
    }

    /// Value the simulated GPU has reached on a timeline.
    pub fn completed_value(&self, semaphore: NativeHandle) -> u64 {
        self.state
            .lock()
            .timelines
            .get(&semaphore)
            .map_or(0, |t| t.completed)
    }

    /// Timeline misuse detected so far: non-increasing signals and waits on
    /// values nothing signals.
    pub fn timeline_violations(&self) -> Vec<String> {
        self.state.lock().timeline_violations.clone()
    }
}

impl Driver for DummyDriver {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn identity(&self) -> DeviceIdentity {
        Self::IDENTITY
    }

    fn timestamp_period(&self) -> f32 {
        1.0
    }

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        self.check_scripted_failure("buffer")?;
        let handle = self.allocate_handle();
        log::trace!(
            "DummyDriver: creating buffer {:?} (size: {}) as {}",
            descriptor.label,
            descriptor.size,
            handle
        );
        Ok((handle, Some(AllocationToken::from_raw(handle.as_raw()))))
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        self.check_scripted_failure("texture")?;
        let handle = self.allocate_handle();
        log::trace!(
            "DummyDriver: creating texture {:?} ({}x{}x{}) as {}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            handle
        );
        Ok((handle, Some(AllocationToken::from_raw(handle.as_raw()))))
    }

    fn create_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.check_scripted_failure("sampler")?;
        let handle = self.allocate_handle();
        log::trace!("DummyDriver: creating sampler {:?} as {}", descriptor.label, handle);
        Ok(handle)
    }

    fn create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.check_scripted_failure("pipeline")?;
        if descriptor.shaders.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "pipeline has no shader stages".to_string(),
            ));
        }
        let handle = self.allocate_handle();
        log::trace!(
            "DummyDriver: creating {:?} pipeline {:?} as {}",
            descriptor.kind,
            descriptor.label,
            handle
        );
        Ok(handle)
    }

    fn create_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.check_scripted_failure("descriptor set")?;
        let handle = self.allocate_handle();
        log::trace!(
            "DummyDriver: creating descriptor set {:?} ({} bindings) as {}",
            descriptor.label,
            descriptor.bindings.len(),
            handle
        );
        Ok(handle)
    }

    fn update_descriptor_set(&self, set: NativeHandle, writes: &[NativeDescriptorWrite]) {
        self.state
            .lock()
            .descriptor_writes
            .push((set, writes.to_vec()));
    }

    fn destroy_buffer(&self, buffer: NativeHandle, _allocation: Option<AllocationToken>) {
        self.destroyed(DummyObjectKind::Buffer, buffer);
    }

    fn destroy_texture(&self, texture: NativeHandle, _allocation: Option<AllocationToken>) {
        self.destroyed(DummyObjectKind::Texture, texture);
    }

    fn destroy_sampler(&self, sampler: NativeHandle) {
        self.destroyed(DummyObjectKind::Sampler, sampler);
    }

    fn destroy_pipeline(&self, pipeline: NativeHandle) {
        self.destroyed(DummyObjectKind::Pipeline, pipeline);
    }

    fn destroy_descriptor_set(&self, set: NativeHandle) {
        self.destroyed(DummyObjectKind::DescriptorSet, set);
    }

    fn load_pipeline_cache(&self, data: &[u8]) -> Result<(), GraphicsError> {
        let payload = data
            .get(crate::pipeline_cache::HEADER_LENGTH..)
            .ok_or_else(|| GraphicsError::InvalidParameter("truncated pipeline cache".into()))?;
        self.state.lock().pipeline_cache = payload.to_vec();
        Ok(())
    }

    fn pipeline_cache_data(&self) -> Vec<u8> {
        let mut data = Self::IDENTITY.header().to_vec();
        data.extend_from_slice(&self.state.lock().pipeline_cache);
        data
    }

    fn create_command_pool(&self, queue: QueueKind) -> Result<NativeHandle, GraphicsError> {
        let handle = self.allocate_handle();
        self.state.lock().command_pools.insert(handle, queue);
        Ok(handle)
    }

    fn allocate_command_buffers(
        &self,
        pool: NativeHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<NativeHandle>, GraphicsError> {
        if !self.state.lock().command_pools.contains_key(&pool) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown command pool {pool}"
            )));
        }
        log::trace!("DummyDriver: allocating {} {:?} command buffers", count, level);
        Ok((0..count).map(|_| self.allocate_handle()).collect())
    }

    fn reset_command_pool(&self, pool: NativeHandle) -> DriverStatus {
        self.state.lock().pool_resets.push(pool);
        DriverStatus::Success
    }

    fn destroy_command_pool(&self, pool: NativeHandle) {
        self.state.lock().command_pools.remove(&pool);
        self.destroyed(DummyObjectKind::CommandPool, pool);
    }

    fn create_query_pool(
        &self,
        kind: QueryKind,
        count: u32,
    ) -> Result<NativeHandle, GraphicsError> {
        let handle = self.allocate_handle();
        self.state.lock().query_pools.insert(handle, (kind, count));
        Ok(handle)
    }

    fn destroy_query_pool(&self, pool: NativeHandle) {
        self.state.lock().query_pools.remove(&pool);
        self.destroyed(DummyObjectKind::QueryPool, pool);
    }

    fn query_results(
        &self,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, DriverStatus> {
        let state = self.state.lock();
        let &(kind, size) = state.query_pools.get(&pool).ok_or(DriverStatus::Unknown(-1))?;
        if first.saturating_add(count) > size {
            return Err(DriverStatus::Unknown(-1));
        }
        // Timestamps advance by a fixed step so elapsed times are predictable.
        Ok((first..first + count)
            .map(|index| match kind {
                QueryKind::Timestamp => u64::from(index) * DUMMY_TIMESTAMP_STEP,
                QueryKind::PipelineStatistics => 0,
            })
            .collect())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: NativeHandle,
        inheritance: Option<&InheritanceInfo>,
    ) -> DriverStatus {
        self.state.lock().commands.insert(
            command_buffer,
            vec![RecordedCommand::Begin {
                inherited: inheritance.is_some(),
            }],
        );
        DriverStatus::Success
    }

    fn end_command_buffer(&self, command_buffer: NativeHandle) -> DriverStatus {
        self.record(command_buffer, RecordedCommand::End);
        DriverStatus::Success
    }

    fn cmd_reset_queries(
        &self,
        command_buffer: NativeHandle,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::ResetQueries { pool, first, count },
        );
    }

    fn cmd_begin_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        self.record(command_buffer, RecordedCommand::BeginQuery(pool, index));
    }

    fn cmd_end_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        self.record(command_buffer, RecordedCommand::EndQuery(pool, index));
    }

    fn cmd_write_timestamp(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        self.record(command_buffer, RecordedCommand::WriteTimestamp(pool, index));
    }

    fn cmd_begin_rendering(&self, command_buffer: NativeHandle, info: &RenderingInfo) {
        self.record(command_buffer, RecordedCommand::BeginRendering(info.clone()));
    }

    fn cmd_end_rendering(&self, command_buffer: NativeHandle) {
        self.record(command_buffer, RecordedCommand::EndRendering);
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: NativeHandle,
        info: &RenderingInfo,
    ) -> Result<RenderPassObjects, GraphicsError> {
        let key = (
            info.color.iter().map(|a| a.format).collect::<Vec<_>>(),
            info.depth.map(|a| a.format),
            info.color
                .iter()
                .chain(info.depth.iter())
                .map(|a| a.target)
                .collect::<Vec<_>>(),
        );
        let objects = *self
            .state
            .lock()
            .render_passes
            .entry(key)
            .or_insert_with(|| RenderPassObjects {
                render_pass: self.allocate_handle(),
                framebuffer: self.allocate_handle(),
            });
        self.record(command_buffer, RecordedCommand::BeginRenderPass(objects));
        Ok(objects)
    }

    fn cmd_end_render_pass(&self, command_buffer: NativeHandle) {
        self.record(command_buffer, RecordedCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle) {
        self.record(command_buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: NativeHandle,
        _pipeline: NativeHandle,
        index: u32,
        set: NativeHandle,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::BindDescriptorSet { index, set },
        );
    }

    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: NativeHandle,
        slot: u32,
        buffer: NativeHandle,
        _offset: u64,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::BindVertexBuffer { slot, buffer },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: NativeHandle,
        buffer: NativeHandle,
        _offset: u64,
        format: IndexFormat,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::BindIndexBuffer { buffer, format },
        );
    }

    fn cmd_draw(&self, command_buffer: NativeHandle, vertices: Range<u32>, instances: Range<u32>) {
        self.record(command_buffer, RecordedCommand::Draw { vertices, instances });
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        indices: Range<u32>,
        _base_vertex: i32,
        instances: Range<u32>,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::DrawIndexed { indices, instances },
        );
    }

    fn cmd_dispatch(&self, command_buffer: NativeHandle, x: u32, y: u32, z: u32) {
        self.record(command_buffer, RecordedCommand::Dispatch(x, y, z));
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        region: &BufferCopy,
    ) {
        self.record(
            command_buffer,
            RecordedCommand::CopyBuffer {
                src,
                dst,
                region: *region,
            },
        );
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        _region: &BufferTextureCopy,
    ) {
        self.record(command_buffer, RecordedCommand::CopyBufferToTexture { src, dst });
    }

    fn cmd_barriers(&self, command_buffer: NativeHandle, barriers: &[Barrier]) {
        self.record(command_buffer, RecordedCommand::Barriers(barriers.to_vec()));
    }

    fn cmd_execute_secondary(&self, command_buffer: NativeHandle, secondaries: &[NativeHandle]) {
        self.record(
            command_buffer,
            RecordedCommand::ExecuteSecondary(secondaries.to_vec()),
        );
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeHandle, GraphicsError> {
        let handle = self.allocate_handle();
        self.state.lock().timelines.insert(
            handle,
            Timeline {
                completed: initial_value,
                pending: initial_value,
            },
        );
        Ok(handle)
    }

    fn create_binary_semaphore(&self) -> Result<NativeHandle, GraphicsError> {
        let handle = self.allocate_handle();
        self.state.lock().binary_semaphores.insert(handle);
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: NativeHandle) {
        {
            let mut state = self.state.lock();
            state.timelines.remove(&semaphore);
            state.binary_semaphores.remove(&semaphore);
        }
        self.destroyed(DummyObjectKind::Semaphore, semaphore);
    }

    fn timeline_value(&self, semaphore: NativeHandle) -> Result<u64, DriverStatus> {
        self.state
            .lock()
            .timelines
            .get(&semaphore)
            .map(|t| t.completed)
            .ok_or(DriverStatus::Unknown(-1))
    }

    fn wait_timeline(&self, semaphore: NativeHandle, value: u64) -> DriverStatus {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.cpu_waits.push((semaphore, value));
        let Some(timeline) = state.timelines.get_mut(&semaphore) else {
            return DriverStatus::Unknown(-1);
        };
        if value > timeline.pending {
            // Nothing will ever signal this value: a real GPU would hang.
            let message = format!(
                "CPU wait for {value} on {semaphore} but highest pending signal is {}",
                timeline.pending
            );
            log::error!("DummyDriver: {}", message);
            state.timeline_violations.push(message);
            return DriverStatus::Timeout;
        }
        timeline.completed = timeline.completed.max(value);
        DriverStatus::Success
    }

    fn submit(&self, queue: QueueKind, info: &SubmitInfo) -> DriverStatus {
        let auto_complete = self.auto_complete.load(Ordering::Acquire);
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for wait in &info.waits {
            if let Some(timeline) = state.timelines.get(&wait.semaphore)
                && wait.value > timeline.pending
            {
                state.timeline_violations.push(format!(
                    "{queue:?} submission waits for {} on {} but highest pending signal is {}",
                    wait.value, wait.semaphore, timeline.pending
                ));
            }
        }

        for signal in &info.signals {
            if let Some(timeline) = state.timelines.get_mut(&signal.semaphore) {
                if signal.value <= timeline.pending {
                    state.timeline_violations.push(format!(
                        "{queue:?} submission signals {} on {} after {}",
                        signal.value, signal.semaphore, timeline.pending
                    ));
                }
                timeline.pending = timeline.pending.max(signal.value);
                if auto_complete {
                    timeline.completed = timeline.pending;
                }
            }
        }

        log::trace!(
            "DummyDriver: {:?} submit of {} command buffers ({} waits, {} signals)",
            queue,
            info.command_buffers.len(),
            info.waits.len(),
            info.signals.len()
        );
        state.submissions.push(SubmissionRecord {
            queue,
            info: info.clone(),
        });
        DriverStatus::Success
    }

    fn wait_idle(&self) -> DriverStatus {
        self.complete_all();
        DriverStatus::Success
    }

    fn has_surface(&self) -> bool {
        self.has_surface
    }

    fn create_swapchain(&self, old: Option<NativeHandle>) -> Result<SwapchainInfo, GraphicsError> {
        if !self.has_surface {
            return Err(GraphicsError::FeatureNotSupported(
                "dummy driver is headless".to_string(),
            ));
        }
        let handle = self.allocate_handle();
        let mut state = self.state.lock();
        state.swapchains_created += 1;
        state.next_image = 0;
        log::trace!(
            "DummyDriver: creating swapchain {} (old: {:?}) {}x{}",
            handle,
            old,
            state.surface_extent.width,
            state.surface_extent.height
        );
        Ok(SwapchainInfo {
            handle,
            image_count: DUMMY_SWAPCHAIN_IMAGES,
            format: TextureFormat::Bgra8UnormSrgb,
            extent: state.surface_extent,
        })
    }

    fn destroy_swapchain(&self, swapchain: NativeHandle) {
        self.destroyed(DummyObjectKind::Swapchain, swapchain);
    }

    fn acquire_next_image(
        &self,
        _swapchain: NativeHandle,
        _signal: NativeHandle,
    ) -> Result<AcquiredImage, DriverStatus> {
        let mut state = self.state.lock();
        let status = state
            .acquire_script
            .pop_front()
            .unwrap_or(DriverStatus::Success);
        match status {
            DriverStatus::Success | DriverStatus::Suboptimal => {
                let index = state.next_image;
                state.next_image = (index + 1) % DUMMY_SWAPCHAIN_IMAGES;
                Ok(AcquiredImage {
                    index,
                    suboptimal: status == DriverStatus::Suboptimal,
                })
            }
            other => Err(other),
        }
    }

    fn present(&self, swapchain: NativeHandle, image_index: u32, _wait: NativeHandle) -> DriverStatus {
        let mut state = self.state.lock();
        let status = state
            .present_script
            .pop_front()
            .unwrap_or(DriverStatus::Success);
        if status.is_success() || status == DriverStatus::Suboptimal {
            state.presents.push((swapchain, image_index));
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SemaphoreSignal, SemaphoreWait, WaitStage};

    fn signal(semaphore: NativeHandle, value: u64) -> SubmitInfo {
        SubmitInfo {
            signals: vec![SemaphoreSignal { semaphore, value }],
            ..Default::default()
        }
    }

    #[test]
    fn test_handles_are_unique() {
        let driver = DummyDriver::new();
        let a = driver.create_sampler(&SamplerDescriptor::default()).unwrap();
        let b = driver.create_sampler(&SamplerDescriptor::default()).unwrap();
        assert_ne!(a, b);
        assert!(!a.is_null());
    }

    #[test]
    fn test_auto_complete_reaches_signal() {
        let driver = DummyDriver::new();
        let timeline = driver.create_timeline_semaphore(0).unwrap();
        driver.submit(QueueKind::Graphics, &signal(timeline, 1));
        assert_eq!(driver.timeline_value(timeline), Ok(1));
    }

    #[test]
    fn test_manual_completion_keeps_work_pending() {
        let driver = DummyDriver::new();
        driver.set_auto_complete(false);
        let timeline = driver.create_timeline_semaphore(0).unwrap();
        driver.submit(QueueKind::Graphics, &signal(timeline, 1));
        driver.submit(QueueKind::Graphics, &signal(timeline, 2));
        assert_eq!(driver.timeline_value(timeline), Ok(0));

        driver.complete_timeline(timeline, 1);
        assert_eq!(driver.timeline_value(timeline), Ok(1));

        assert_eq!(driver.wait_timeline(timeline, 2), DriverStatus::Success);
        assert_eq!(driver.timeline_value(timeline), Ok(2));
        assert_eq!(driver.cpu_waits(), vec![(timeline, 2)]);
    }

    #[test]
    fn test_waiting_on_unsignaled_value_is_a_violation() {
        let driver = DummyDriver::new();
        let timeline = driver.create_timeline_semaphore(0).unwrap();
        assert_eq!(driver.wait_timeline(timeline, 5), DriverStatus::Timeout);

        let info = SubmitInfo {
            waits: vec![SemaphoreWait {
                semaphore: timeline,
                value: 3,
                stage: WaitStage::AllCommands,
            }],
            ..Default::default()
        };
        driver.submit(QueueKind::Compute, &info);
        assert_eq!(driver.timeline_violations().len(), 2);
    }

    #[test]
    fn test_non_increasing_signal_is_a_violation() {
        let driver = DummyDriver::new();
        let timeline = driver.create_timeline_semaphore(0).unwrap();
        driver.submit(QueueKind::Graphics, &signal(timeline, 2));
        driver.submit(QueueKind::Graphics, &signal(timeline, 2));
        assert_eq!(driver.timeline_violations().len(), 1);
    }

    #[test]
    fn test_scripted_acquire_and_present() {
        let driver = DummyDriver::new();
        let swapchain = driver.create_swapchain(None).unwrap();
        let semaphore = driver.create_binary_semaphore().unwrap();

        driver.script_acquire(DriverStatus::OutOfDate);
        assert_eq!(
            driver.acquire_next_image(swapchain.handle, semaphore),
            Err(DriverStatus::OutOfDate)
        );
        let image = driver.acquire_next_image(swapchain.handle, semaphore).unwrap();
        assert_eq!(image.index, 0);

        driver.script_present(DriverStatus::Suboptimal);
        assert_eq!(
            driver.present(swapchain.handle, image.index, semaphore),
            DriverStatus::Suboptimal
        );
    }

    #[test]
    fn test_headless_has_no_swapchain() {
        let driver = DummyDriver::headless();
        assert!(!driver.has_surface());
        assert!(driver.create_swapchain(None).is_err());
    }

    #[test]
    fn test_scripted_creation_failure() {
        let driver = DummyDriver::new();
        driver.fail_next_create();
        assert!(driver.create_buffer(&BufferDescriptor::default()).is_err());
        assert!(driver.create_buffer(&BufferDescriptor::default()).is_ok());
    }

    #[test]
    fn test_render_pass_objects_are_cached() {
        let driver = DummyDriver::new();
        let cb = NativeHandle::from_raw(999);
        let info = RenderingInfo {
            color: Vec::new(),
            depth: None,
            extent: Extent2d::new(4, 4),
            secondary_contents: false,
        };
        let first = driver.cmd_begin_render_pass(cb, &info).unwrap();
        let second = driver.cmd_begin_render_pass(cb, &info).unwrap();
        assert_eq!(first, second);
    }
}
