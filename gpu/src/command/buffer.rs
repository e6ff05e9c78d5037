//! Command buffer recording state machine.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::driver::{
    Barrier, BufferCopy, BufferTextureCopy, CommandBufferLevel, Driver, InheritanceInfo,
    NativeHandle, QueueKind, RenderPassObjects,
};
use crate::error::fatal_driver_error;
use crate::frame::Backbuffer;
use crate::pools::PoolSlot;
use crate::resources::{Buffer, DescriptorSet, GpuResource, Pipeline, Texture};
use crate::types::{Extent2d, IndexFormat, PipelineKind, ResourceState, TextureFormat};

use super::render_pass::RenderPassDescriptor;

/// Query ranges owned by a primary graphics command buffer.
#[derive(Debug, Clone)]
pub(crate) struct QueryRanges {
    pub timestamp_pool: NativeHandle,
    pub timestamps: Range<u32>,
    pub statistics_pool: NativeHandle,
    pub statistics_query: u32,
}

/// Render pass open on a primary, or inherited by a secondary.
#[derive(Debug, Clone)]
struct ActiveRenderPass {
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    objects: Option<RenderPassObjects>,
    extent: Extent2d,
    secondary_contents: bool,
}

#[derive(Debug, Default)]
struct RecordingState {
    recording: bool,
    /// Recording finished, waiting to be submitted.
    ended: bool,
    render_pass: Option<ActiveRenderPass>,
    timestamps_written: u32,
    statistics_open: bool,
}

/// Timestamps a submitted primary wrote, for readback once it retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimestampSpan {
    pub pool: NativeHandle,
    pub first: u32,
    pub count: u32,
}

/// A command buffer owned by one pool slot.
///
/// Handed out by the [`CommandBufferManager`](super::CommandBufferManager)
/// and recorded by the thread owning the slot. Misuse of the state machine
/// (recording while not begun, beginning twice, ending twice) logs a warning
/// and is otherwise ignored.
pub struct CommandBuffer {
    native: NativeHandle,
    slot: PoolSlot,
    level: CommandBufferLevel,
    queue: QueueKind,
    index: u32,
    usage_count: AtomicU64,
    queries: Option<QueryRanges>,
    use_dynamic_render_paths: bool,
    driver: Arc<dyn Driver>,
    state: Mutex<RecordingState>,
}

impl CommandBuffer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        native: NativeHandle,
        slot: PoolSlot,
        level: CommandBufferLevel,
        queue: QueueKind,
        index: u32,
        queries: Option<QueryRanges>,
        use_dynamic_render_paths: bool,
    ) -> Self {
        Self {
            native,
            slot,
            level,
            queue,
            index,
            usage_count: AtomicU64::new(0),
            queries,
            use_dynamic_render_paths,
            driver,
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// The native command buffer.
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    /// Pool slot the buffer belongs to.
    pub fn slot(&self) -> PoolSlot {
        self.slot
    }

    /// Primary or secondary.
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Queue the buffer is submitted to.
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Index within its slot and budget.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// How many times the buffer has been handed out.
    pub fn usage_count(&self) -> u64 {
        self.usage_count.load(Ordering::Relaxed)
    }

    /// Whether the buffer is between `begin` and `end`.
    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Whether recording finished and the buffer awaits submission.
    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Whether a render pass is open (or inherited).
    pub fn has_active_render_pass(&self) -> bool {
        self.state.lock().render_pass.is_some()
    }

    /// Number of timestamps written since `begin`.
    pub fn timestamps_written(&self) -> u32 {
        self.state.lock().timestamps_written
    }

    /// Called by the manager each time the buffer is handed out.
    pub(crate) fn mark_handed_out(&self) {
        self.usage_count.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if state.recording {
            log::warn!(
                "CommandBuffer {}: handed out again while still recording, state dropped",
                self.native
            );
        }
        *state = RecordingState::default();
    }

    /// Forget recording state after the pool was reset.
    pub(crate) fn reset_state(&self) {
        *self.state.lock() = RecordingState::default();
    }

    /// Lock the state if recording, warn otherwise.
    fn recording(&self, operation: &str) -> Option<MutexGuard<'_, RecordingState>> {
        let state = self.state.lock();
        if state.recording {
            Some(state)
        } else {
            log::warn!(
                "CommandBuffer {}: {} while not recording, ignored",
                self.native,
                operation
            );
            None
        }
    }

    // ---- State machine ----------------------------------------------------

    /// Begin recording a primary command buffer.
    ///
    /// Resets the buffer's timestamp range and statistics query and opens
    /// the statistics query, which stays open until submission.
    pub fn begin(&self) {
        if self.level == CommandBufferLevel::Secondary {
            log::warn!(
                "CommandBuffer {}: begin on a secondary buffer, use begin_secondary",
                self.native
            );
            return;
        }

        let mut state = self.state.lock();
        if state.recording {
            log::warn!("CommandBuffer {}: begin while already recording", self.native);
            return;
        }

        let status = self.driver.begin_command_buffer(self.native, None);
        if !status.is_success() {
            fatal_driver_error("CommandBuffer::begin", status);
        }

        *state = RecordingState {
            recording: true,
            ..Default::default()
        };

        if let Some(queries) = &self.queries {
            if !queries.timestamp_pool.is_null() && !queries.timestamps.is_empty() {
                self.driver.cmd_reset_queries(
                    self.native,
                    queries.timestamp_pool,
                    queries.timestamps.start,
                    queries.timestamps.len() as u32,
                );
            }
            self.driver.cmd_reset_queries(
                self.native,
                queries.statistics_pool,
                queries.statistics_query,
                1,
            );
            self.driver
                .cmd_begin_query(self.native, queries.statistics_pool, queries.statistics_query);
            state.statistics_open = true;
        }
    }

    /// Begin recording a secondary command buffer inside `parent`'s render
    /// pass, inheriting its attachment formats or render pass objects.
    ///
    /// # Panics
    ///
    /// Panics if `parent` has no active render pass.
    #[track_caller]
    pub fn begin_secondary(&self, parent: &CommandBuffer) {
        if self.level != CommandBufferLevel::Secondary {
            log::warn!(
                "CommandBuffer {}: begin_secondary on a primary buffer, ignored",
                self.native
            );
            return;
        }

        let pass = parent.state.lock().render_pass.clone();
        let Some(pass) = pass else {
            log::error!(
                "CommandBuffer {}: begin_secondary but parent {} has no active render pass",
                self.native,
                parent.native
            );
            panic!("begin_secondary requires the parent to have an active render pass");
        };
        if !pass.secondary_contents {
            log::warn!(
                "CommandBuffer {}: parent render pass was not begun for secondary contents, ignored",
                self.native
            );
            return;
        }

        let mut state = self.state.lock();
        if state.recording {
            log::warn!("CommandBuffer {}: begin while already recording", self.native);
            return;
        }

        let inheritance = InheritanceInfo {
            color_formats: pass.color_formats.clone(),
            depth_format: pass.depth_format,
            objects: pass.objects,
            extent: pass.extent,
        };
        let status = self
            .driver
            .begin_command_buffer(self.native, Some(&inheritance));
        if !status.is_success() {
            fatal_driver_error("CommandBuffer::begin_secondary", status);
        }

        *state = RecordingState {
            recording: true,
            render_pass: Some(pass),
            ..Default::default()
        };
    }

    /// Finish recording.
    ///
    /// Secondaries end natively right away. Primaries end natively when
    /// submitted, after their statistics query is closed.
    pub fn end(&self) {
        let Some(mut state) = self.recording("end") else {
            return;
        };

        if self.level == CommandBufferLevel::Primary {
            if let Some(pass) = state.render_pass.take() {
                log::warn!(
                    "CommandBuffer {}: end with an open render pass, closing it",
                    self.native
                );
                self.close_render_pass(&pass);
            }
        } else {
            let status = self.driver.end_command_buffer(self.native);
            if !status.is_success() {
                fatal_driver_error("CommandBuffer::end", status);
            }
            state.render_pass = None;
        }

        state.recording = false;
        state.ended = true;
    }

    /// Close queries and end natively before submission.
    ///
    /// Returns false if the buffer has nothing to submit.
    pub(crate) fn finalize(&self) -> bool {
        let mut state = self.state.lock();
        if state.recording {
            log::warn!(
                "CommandBuffer {}: submitted while still recording, ending it",
                self.native
            );
            if let Some(pass) = state.render_pass.take() {
                self.close_render_pass(&pass);
            }
            state.recording = false;
            state.ended = true;
        }
        if !state.ended {
            log::warn!(
                "CommandBuffer {}: queued without being recorded, skipped",
                self.native
            );
            return false;
        }

        if state.statistics_open
            && let Some(queries) = &self.queries
        {
            self.driver
                .cmd_end_query(self.native, queries.statistics_pool, queries.statistics_query);
            state.statistics_open = false;
        }

        let status = self.driver.end_command_buffer(self.native);
        if !status.is_success() {
            fatal_driver_error("CommandBuffer::finalize", status);
        }
        state.ended = false;
        true
    }

    /// Timestamps written by this buffer since `begin`.
    pub(crate) fn timestamp_span(&self) -> Option<TimestampSpan> {
        let queries = self.queries.as_ref()?;
        let count = self.state.lock().timestamps_written;
        (count > 0 && !queries.timestamp_pool.is_null()).then(|| TimestampSpan {
            pool: queries.timestamp_pool,
            first: queries.timestamps.start,
            count,
        })
    }

    // ---- Render passes ----------------------------------------------------

    /// Begin a render pass on a primary buffer.
    ///
    /// Uses dynamic rendering or render pass objects depending on
    /// [`DeviceConfig::use_dynamic_render_paths`](crate::DeviceConfig::use_dynamic_render_paths).
    pub fn begin_render_pass(&self, descriptor: &RenderPassDescriptor) {
        let Some(mut state) = self.recording("begin_render_pass") else {
            return;
        };
        if self.level == CommandBufferLevel::Secondary {
            log::warn!(
                "CommandBuffer {}: secondaries cannot begin render passes",
                self.native
            );
            return;
        }
        if state.render_pass.is_some() {
            log::warn!(
                "CommandBuffer {}: begin_render_pass {:?} inside another render pass, ignored",
                self.native,
                descriptor.label
            );
            return;
        }

        let info = match descriptor.lower() {
            Ok(info) => info,
            Err(e) => {
                log::error!(
                    "CommandBuffer {}: cannot begin render pass {:?}: {}",
                    self.native,
                    descriptor.label,
                    e
                );
                return;
            }
        };

        let objects = if self.use_dynamic_render_paths {
            self.driver.cmd_begin_rendering(self.native, &info);
            None
        } else {
            match self.driver.cmd_begin_render_pass(self.native, &info) {
                Ok(objects) => Some(objects),
                Err(e) => {
                    log::error!(
                        "CommandBuffer {}: cannot create render pass objects for {:?}: {}",
                        self.native,
                        descriptor.label,
                        e
                    );
                    return;
                }
            }
        };

        state.render_pass = Some(ActiveRenderPass {
            color_formats: info.color.iter().map(|a| a.format).collect(),
            depth_format: info.depth.map(|a| a.format),
            objects,
            extent: info.extent,
            secondary_contents: descriptor.secondary_contents,
        });
    }

    /// End the open render pass.
    pub fn end_current_render_pass(&self) {
        let Some(mut state) = self.recording("end_current_render_pass") else {
            return;
        };
        if self.level == CommandBufferLevel::Secondary {
            log::warn!(
                "CommandBuffer {}: secondaries cannot end their inherited render pass",
                self.native
            );
            return;
        }
        match state.render_pass.take() {
            Some(pass) => self.close_render_pass(&pass),
            None => log::warn!(
                "CommandBuffer {}: end_current_render_pass without a render pass",
                self.native
            ),
        }
    }

    fn close_render_pass(&self, pass: &ActiveRenderPass) {
        if pass.objects.is_some() {
            self.driver.cmd_end_render_pass(self.native);
        } else {
            self.driver.cmd_end_rendering(self.native);
        }
    }

    // ---- Bindings and work ------------------------------------------------

    /// Bind a pipeline.
    pub fn bind_pipeline(&self, pipeline: &Pipeline) {
        let Some(state) = self.recording("bind_pipeline") else {
            return;
        };
        if pipeline.kind() == PipelineKind::Graphics && state.render_pass.is_none() {
            log::warn!(
                "CommandBuffer {}: graphics pipeline {:?} bound outside a render pass",
                self.native,
                pipeline.label()
            );
        }
        self.driver.cmd_bind_pipeline(self.native, pipeline.native());
    }

    /// Bind a descriptor set at `index` of `pipeline`'s layout.
    pub fn bind_descriptor_set(&self, pipeline: &Pipeline, index: u32, set: &DescriptorSet) {
        let Some(_state) = self.recording("bind_descriptor_set") else {
            return;
        };
        if index as usize >= pipeline.set_count() {
            log::warn!(
                "CommandBuffer {}: pipeline {:?} has no descriptor set {}, ignored",
                self.native,
                pipeline.label(),
                index
            );
            return;
        }
        self.driver
            .cmd_bind_descriptor_set(self.native, pipeline.native(), index, set.native());
    }

    /// Bind a vertex buffer to `slot`.
    pub fn bind_vertex_buffer(&self, slot: u32, buffer: &Buffer, offset: u64) {
        let Some(_state) = self.recording("bind_vertex_buffer") else {
            return;
        };
        self.driver
            .cmd_bind_vertex_buffer(self.native, slot, buffer.native(), offset);
    }

    /// Bind an index buffer.
    pub fn bind_index_buffer(&self, buffer: &Buffer, offset: u64, format: IndexFormat) {
        let Some(_state) = self.recording("bind_index_buffer") else {
            return;
        };
        self.driver
            .cmd_bind_index_buffer(self.native, buffer.native(), offset, format);
    }

    fn in_render_pass(&self, state: &RecordingState, operation: &str) -> bool {
        if state.render_pass.is_none() {
            log::warn!(
                "CommandBuffer {}: {} outside a render pass, ignored",
                self.native,
                operation
            );
            return false;
        }
        true
    }

    fn outside_render_pass(&self, state: &RecordingState, operation: &str) -> bool {
        if state.render_pass.is_some() {
            log::warn!(
                "CommandBuffer {}: {} inside a render pass, ignored",
                self.native,
                operation
            );
            return false;
        }
        true
    }

    /// Draw non-indexed primitives.
    pub fn draw(&self, vertices: Range<u32>, instances: Range<u32>) {
        let Some(state) = self.recording("draw") else {
            return;
        };
        if self.in_render_pass(&state, "draw") {
            self.driver.cmd_draw(self.native, vertices, instances);
        }
    }

    /// Draw indexed primitives.
    pub fn draw_indexed(&self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        let Some(state) = self.recording("draw_indexed") else {
            return;
        };
        if self.in_render_pass(&state, "draw_indexed") {
            self.driver
                .cmd_draw_indexed(self.native, indices, base_vertex, instances);
        }
    }

    /// Dispatch compute work groups.
    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        let Some(state) = self.recording("dispatch") else {
            return;
        };
        if self.outside_render_pass(&state, "dispatch") {
            self.driver.cmd_dispatch(self.native, x, y, z);
        }
    }

    /// Copy between buffers.
    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer, region: BufferCopy) {
        let Some(state) = self.recording("copy_buffer") else {
            return;
        };
        let in_bounds = |offset: u64, size: u64| {
            offset
                .checked_add(region.size)
                .is_some_and(|end| end <= size)
        };
        if !in_bounds(region.src_offset, src.size()) || !in_bounds(region.dst_offset, dst.size()) {
            log::warn!(
                "CommandBuffer {}: copy of {} bytes out of bounds, ignored",
                self.native,
                region.size
            );
            return;
        }
        if self.outside_render_pass(&state, "copy_buffer") {
            self.driver
                .cmd_copy_buffer(self.native, src.native(), dst.native(), &region);
        }
    }

    /// Copy buffer contents into a texture.
    pub fn copy_buffer_to_texture(&self, src: &Buffer, dst: &Texture, region: BufferTextureCopy) {
        let Some(state) = self.recording("copy_buffer_to_texture") else {
            return;
        };
        if region.mip_level >= dst.mip_level_count() {
            log::warn!(
                "CommandBuffer {}: copy into missing mip level {}, ignored",
                self.native,
                region.mip_level
            );
            return;
        }
        if self.outside_render_pass(&state, "copy_buffer_to_texture") {
            self.driver
                .cmd_copy_buffer_to_texture(self.native, src.native(), dst.native(), &region);
        }
    }

    // ---- Transitions ------------------------------------------------------

    /// Transition a buffer to `to`, emitting a barrier if needed.
    pub fn transition_buffer(&self, buffer: &Buffer, to: ResourceState) {
        let Some(state) = self.recording("transition_buffer") else {
            return;
        };
        if !self.outside_render_pass(&state, "transition_buffer") {
            return;
        }
        let from = buffer.state_cell().replace(to);
        if from.needs_barrier(to) {
            self.driver.cmd_barriers(
                self.native,
                &[Barrier::Buffer {
                    buffer: buffer.native(),
                    from,
                    to,
                }],
            );
        }
    }

    /// Transition a texture to `to`, emitting a barrier if needed.
    pub fn transition_texture(&self, texture: &Texture, to: ResourceState) {
        let Some(state) = self.recording("transition_texture") else {
            return;
        };
        if !self.outside_render_pass(&state, "transition_texture") {
            return;
        }
        let from = texture.state_cell().replace(to);
        if from.needs_barrier(to) {
            self.driver.cmd_barriers(
                self.native,
                &[Barrier::Texture {
                    texture: texture.native(),
                    format: texture.format(),
                    from,
                    to,
                }],
            );
        }
    }

    /// Transition the acquired swapchain image to `to`.
    pub fn transition_backbuffer(&self, backbuffer: &Backbuffer, to: ResourceState) {
        let Some(state) = self.recording("transition_backbuffer") else {
            return;
        };
        if !self.outside_render_pass(&state, "transition_backbuffer") {
            return;
        }
        let from = backbuffer.state_cell().replace(to);
        if from.needs_barrier(to) {
            self.driver.cmd_barriers(
                self.native,
                &[Barrier::SwapchainImage {
                    index: backbuffer.index(),
                    from,
                    to,
                }],
            );
        }
    }

    // ---- Queries and secondaries ------------------------------------------

    /// Write a GPU timestamp.
    ///
    /// Returns the timestamp's position within this buffer, or `None` when
    /// the buffer has no timestamp queries left.
    pub fn write_timestamp(&self) -> Option<u32> {
        let mut state = self.recording("write_timestamp")?;
        let Some(queries) = self.queries.as_ref().filter(|q| !q.timestamp_pool.is_null()) else {
            log::warn!(
                "CommandBuffer {}: no timestamp queries on this buffer",
                self.native
            );
            return None;
        };
        let written = state.timestamps_written;
        if written as usize >= queries.timestamps.len() {
            log::warn!(
                "CommandBuffer {}: all {} timestamp queries used this frame",
                self.native,
                queries.timestamps.len()
            );
            return None;
        }
        self.driver.cmd_write_timestamp(
            self.native,
            queries.timestamp_pool,
            queries.timestamps.start + written,
        );
        state.timestamps_written = written + 1;
        Some(written)
    }

    /// Execute recorded secondaries inside this buffer's render pass.
    ///
    /// Secondaries still recording are skipped.
    pub fn execute_secondary(&self, secondaries: &[&CommandBuffer]) {
        let Some(state) = self.recording("execute_secondary") else {
            return;
        };
        match &state.render_pass {
            Some(pass) if pass.secondary_contents => {}
            Some(_) => {
                log::warn!(
                    "CommandBuffer {}: render pass not begun for secondary contents, ignored",
                    self.native
                );
                return;
            }
            None => {
                log::warn!(
                    "CommandBuffer {}: execute_secondary outside a render pass, ignored",
                    self.native
                );
                return;
            }
        }

        let natives: Vec<_> = secondaries
            .iter()
            .filter(|cb| {
                let ready = cb.level == CommandBufferLevel::Secondary && cb.is_ended();
                if !ready {
                    log::warn!(
                        "CommandBuffer {}: secondary {} is not a finished secondary, skipped",
                        self.native,
                        cb.native
                    );
                }
                ready
            })
            .map(|cb| cb.native)
            .collect();
        if !natives.is_empty() {
            self.driver.cmd_execute_secondary(self.native, &natives);
        }
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("native", &self.native)
            .field("slot", &self.slot)
            .field("level", &self.level)
            .field("queue", &self.queue)
            .field("index", &self.index)
            .field("usage_count", &self.usage_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::driver::dummy::RecordedCommand;

    fn primary(driver: &Arc<DummyDriver>, queries: bool) -> CommandBuffer {
        let queries = queries.then(|| QueryRanges {
            timestamp_pool: NativeHandle::from_raw(100),
            timestamps: 4..6,
            statistics_pool: NativeHandle::from_raw(200),
            statistics_query: 2,
        });
        CommandBuffer::new(
            driver.clone(),
            NativeHandle::from_raw(1),
            PoolSlot::new(0, 0),
            CommandBufferLevel::Primary,
            QueueKind::Graphics,
            2,
            queries,
            true,
        )
    }

    #[test]
    fn test_begin_resets_and_opens_queries() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, true);
        cb.begin();
        assert!(cb.is_recording());
        assert_eq!(
            driver.commands(cb.native()),
            vec![
                RecordedCommand::Begin { inherited: false },
                RecordedCommand::ResetQueries {
                    pool: NativeHandle::from_raw(100),
                    first: 4,
                    count: 2
                },
                RecordedCommand::ResetQueries {
                    pool: NativeHandle::from_raw(200),
                    first: 2,
                    count: 1
                },
                RecordedCommand::BeginQuery(NativeHandle::from_raw(200), 2),
            ]
        );
    }

    #[test]
    fn test_double_begin_and_double_end_are_ignored() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, false);
        cb.begin();
        cb.begin();
        cb.end();
        cb.end();
        assert!(cb.is_ended());
        // Primaries are not ended natively before submission.
        assert_eq!(
            driver.commands(cb.native()),
            vec![RecordedCommand::Begin { inherited: false }]
        );
    }

    #[test]
    fn test_finalize_closes_statistics_then_ends() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, true);
        cb.begin();
        cb.end();
        assert!(cb.finalize());
        let commands = driver.commands(cb.native());
        let tail = &commands[commands.len() - 2..];
        assert_eq!(
            tail,
            &[
                RecordedCommand::EndQuery(NativeHandle::from_raw(200), 2),
                RecordedCommand::End
            ]
        );
    }

    #[test]
    fn test_finalize_without_recording_skips() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, true);
        assert!(!cb.finalize());
    }

    #[test]
    fn test_timestamp_budget() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, true);
        cb.begin();
        assert_eq!(cb.write_timestamp(), Some(0));
        assert_eq!(cb.write_timestamp(), Some(1));
        assert_eq!(cb.write_timestamp(), None);
        assert_eq!(cb.timestamps_written(), 2);
        assert_eq!(
            cb.timestamp_span(),
            Some(TimestampSpan {
                pool: NativeHandle::from_raw(100),
                first: 4,
                count: 2
            })
        );
    }

    #[test]
    fn test_draw_outside_render_pass_is_ignored() {
        let driver = Arc::new(DummyDriver::new());
        let cb = primary(&driver, false);
        cb.draw(0..3, 0..1);
        cb.begin();
        cb.draw(0..3, 0..1);
        cb.dispatch(1, 1, 1);
        assert_eq!(
            driver.commands(cb.native()),
            vec![
                RecordedCommand::Begin { inherited: false },
                RecordedCommand::Dispatch(1, 1, 1)
            ]
        );
    }

    #[test]
    #[should_panic(expected = "active render pass")]
    fn test_begin_secondary_without_render_pass_panics() {
        let driver = Arc::new(DummyDriver::new());
        let parent = primary(&driver, false);
        parent.begin();
        let secondary = CommandBuffer::new(
            driver.clone(),
            NativeHandle::from_raw(2),
            PoolSlot::new(0, 0),
            CommandBufferLevel::Secondary,
            QueueKind::Graphics,
            0,
            None,
            true,
        );
        secondary.begin_secondary(&parent);
    }
}
