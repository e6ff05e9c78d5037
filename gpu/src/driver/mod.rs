//! Driver abstraction layer.
//!
//! Everything above this module talks to the GPU through the [`Driver`]
//! trait: resource creation and destruction, command pools, recording,
//! timeline semaphores, submission and presentation. Native objects cross
//! the seam as opaque [`NativeHandle`]s.
//!
//! # Available Drivers
//!
//! - [`DummyDriver`] (always built): no GPU, records every call so the
//!   frame machinery can be tested deterministically
//! - `VulkanDriver` (`vulkan-backend` feature): native Vulkan via ash
//!
//! # Call Discipline
//!
//! Creation, recording and query calls may come from any thread. Destroy
//! calls, pool resets, submission, presentation and timeline waits are only
//! issued from the control thread that owns the
//! [`FrameCoordinator`](crate::FrameCoordinator).

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::error::GraphicsError;
use crate::pipeline_cache::DeviceIdentity;
use crate::types::{
    BufferDescriptor, ClearValue, DescriptorSetDescriptor, DescriptorType, Extent2d, Extent3d,
    IndexFormat, LoadOp, PipelineDescriptor, ResourceState, SamplerDescriptor, StoreOp,
    TextureDescriptor, TextureFormat,
};

pub use dummy::DummyDriver;

/// Opaque native driver object.
///
/// Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wrap a raw driver value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw driver value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns true for the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Memory allocation owned by the driver on behalf of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationToken(u64);

impl AllocationToken {
    /// Wrap a raw allocation id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw allocation id.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Result code of a driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    /// The operation succeeded.
    Success,
    /// Presentation works but the swapchain no longer matches the surface.
    Suboptimal,
    /// The swapchain is out of date and must be rebuilt.
    OutOfDate,
    /// A wait timed out.
    Timeout,
    /// The presentation surface is gone.
    SurfaceLost,
    /// The device was lost.
    DeviceLost,
    /// Device memory exhausted.
    OutOfDeviceMemory,
    /// Host memory exhausted.
    OutOfHostMemory,
    /// Any other driver code.
    Unknown(i32),
}

impl DriverStatus {
    /// Returns true for [`DriverStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Returns true when the swapchain needs rebuilding.
    pub fn is_stale_surface(self) -> bool {
        matches!(self, Self::Suboptimal | Self::OutOfDate)
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Suboptimal => write!(f, "suboptimal"),
            Self::OutOfDate => write!(f, "out of date"),
            Self::Timeout => write!(f, "timeout"),
            Self::SurfaceLost => write!(f, "surface lost"),
            Self::DeviceLost => write!(f, "device lost"),
            Self::OutOfDeviceMemory => write!(f, "out of device memory"),
            Self::OutOfHostMemory => write!(f, "out of host memory"),
            Self::Unknown(code) => write!(f, "unknown status {code}"),
        }
    }
}

/// GPU queue a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics + present queue.
    Graphics,
    /// Asynchronous compute queue.
    Compute,
}

/// Primary or secondary command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    /// Submitted directly to a queue.
    Primary,
    /// Executed from inside a primary's render pass.
    Secondary,
}

/// Kind of query pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// GPU timestamps.
    Timestamp,
    /// Pipeline statistics counters.
    PipelineStatistics,
}

/// Pipeline stage a semaphore wait blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStage {
    /// Color attachment output (swapchain acquire).
    ColorOutput,
    /// Compute shader.
    ComputeShader,
    /// Everything.
    AllCommands,
}

/// Semaphore wait of a submission. `value` is ignored for binary semaphores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    /// Semaphore to wait on.
    pub semaphore: NativeHandle,
    /// Timeline value to reach.
    pub value: u64,
    /// Stage that waits.
    pub stage: WaitStage,
}

/// Semaphore signal of a submission. `value` is ignored for binary semaphores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreSignal {
    /// Semaphore to signal.
    pub semaphore: NativeHandle,
    /// Timeline value to signal.
    pub value: u64,
}

/// One queue submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Command buffers, executed in order.
    pub command_buffers: Vec<NativeHandle>,
    /// Semaphores waited before execution.
    pub waits: Vec<SemaphoreWait>,
    /// Semaphores signaled after execution.
    pub signals: Vec<SemaphoreSignal>,
}

/// A swapchain image handed out by the presentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Swapchain image index.
    pub index: u32,
    /// The image is usable but the swapchain should be rebuilt.
    pub suboptimal: bool,
}

/// A created swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    /// Native swapchain.
    pub handle: NativeHandle,
    /// Number of images.
    pub image_count: u32,
    /// Image format.
    pub format: TextureFormat,
    /// Image size.
    pub extent: Extent2d,
}

/// Render target of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeTarget {
    /// A texture created through the device.
    Texture(NativeHandle),
    /// An image of the current swapchain.
    SwapchainImage(u32),
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeAttachment {
    /// Image rendered to.
    pub target: NativeTarget,
    /// Its format.
    pub format: TextureFormat,
    /// Load operation.
    pub load: LoadOp,
    /// Store operation.
    pub store: StoreOp,
    /// Clear value used with [`LoadOp::Clear`].
    pub clear: ClearValue,
}

/// Everything a driver needs to begin a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    /// Color attachments.
    pub color: Vec<NativeAttachment>,
    /// Depth attachment.
    pub depth: Option<NativeAttachment>,
    /// Render area.
    pub extent: Extent2d,
    /// The pass body is recorded in secondary command buffers.
    pub secondary_contents: bool,
}

/// Render pass and framebuffer objects used on the object-based path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassObjects {
    /// Render pass object.
    pub render_pass: NativeHandle,
    /// Framebuffer object.
    pub framebuffer: NativeHandle,
}

/// Render pass state a secondary command buffer inherits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceInfo {
    /// Color attachment formats (dynamic path).
    pub color_formats: Vec<TextureFormat>,
    /// Depth attachment format (dynamic path).
    pub depth_format: Option<TextureFormat>,
    /// Render pass objects (object path).
    pub objects: Option<RenderPassObjects>,
    /// Render area of the parent pass.
    pub extent: Extent2d,
}

/// A resource state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Buffer transition.
    Buffer {
        /// The buffer.
        buffer: NativeHandle,
        /// Previous state.
        from: ResourceState,
        /// Next state.
        to: ResourceState,
    },
    /// Texture transition.
    Texture {
        /// The texture.
        texture: NativeHandle,
        /// Its format (selects depth/color aspects).
        format: TextureFormat,
        /// Previous state.
        from: ResourceState,
        /// Next state.
        to: ResourceState,
    },
    /// Transition of an image of the current swapchain.
    SwapchainImage {
        /// Image index.
        index: u32,
        /// Previous state.
        from: ResourceState,
        /// Next state.
        to: ResourceState,
    },
}

/// Buffer-to-buffer copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    /// Offset in the source buffer.
    pub src_offset: u64,
    /// Offset in the destination buffer.
    pub dst_offset: u64,
    /// Bytes to copy.
    pub size: u64,
}

/// Buffer-to-texture copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopy {
    /// Offset of the first texel in the buffer.
    pub buffer_offset: u64,
    /// Row pitch in texels, zero for tightly packed rows.
    pub buffer_row_length: u32,
    /// Destination mip level.
    pub mip_level: u32,
    /// Copied region size.
    pub extent: Extent3d,
}

/// Resource bound by a descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeBinding {
    /// Range of a buffer.
    Buffer {
        /// The buffer.
        buffer: NativeHandle,
        /// Start of the range.
        offset: u64,
        /// Size of the range.
        range: u64,
    },
    /// A texture view.
    Texture(NativeHandle),
    /// A sampler.
    Sampler(NativeHandle),
    /// A texture with its sampler.
    TextureSampler {
        /// The texture.
        texture: NativeHandle,
        /// The sampler.
        sampler: NativeHandle,
    },
}

/// One descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDescriptorWrite {
    /// Binding number.
    pub binding: u32,
    /// Array element.
    pub array_element: u32,
    /// Descriptor type of the binding.
    pub ty: DescriptorType,
    /// Bound resource.
    pub resource: NativeBinding,
}

/// Driver trait for abstracting GPU APIs.
pub trait Driver: Send + Sync + 'static {
    /// Get the driver name.
    fn name(&self) -> &'static str;

    /// Vendor/device identity, used to key pipeline cache blobs.
    fn identity(&self) -> DeviceIdentity;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    // ---- Resources --------------------------------------------------------

    /// Create a buffer and its memory.
    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError>;

    /// Create a texture, its view and its memory.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError>;

    /// Create a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor)
    -> Result<NativeHandle, GraphicsError>;

    /// Create a pipeline and its layout.
    fn create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<NativeHandle, GraphicsError>;

    /// Create a descriptor set and its layout.
    fn create_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Result<NativeHandle, GraphicsError>;

    /// Write resources into a descriptor set.
    fn update_descriptor_set(&self, set: NativeHandle, writes: &[NativeDescriptorWrite]);

    /// Release a buffer and its memory.
    fn destroy_buffer(&self, buffer: NativeHandle, allocation: Option<AllocationToken>);

    /// Release a texture, its view and its memory.
    fn destroy_texture(&self, texture: NativeHandle, allocation: Option<AllocationToken>);

    /// Release a sampler.
    fn destroy_sampler(&self, sampler: NativeHandle);

    /// Release a pipeline and its layout.
    fn destroy_pipeline(&self, pipeline: NativeHandle);

    /// Release a descriptor set and its layout.
    fn destroy_descriptor_set(&self, set: NativeHandle);

    /// Seed the pipeline cache with a previously saved blob.
    fn load_pipeline_cache(&self, data: &[u8]) -> Result<(), GraphicsError>;

    /// Current pipeline cache contents, header included.
    fn pipeline_cache_data(&self) -> Vec<u8>;

    // ---- Pools --------------------------------------------------------------

    /// Create a command pool for a queue family.
    fn create_command_pool(&self, queue: QueueKind) -> Result<NativeHandle, GraphicsError>;

    /// Allocate command buffers from a pool.
    fn allocate_command_buffers(
        &self,
        pool: NativeHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<NativeHandle>, GraphicsError>;

    /// Reset a command pool and every buffer allocated from it.
    fn reset_command_pool(&self, pool: NativeHandle) -> DriverStatus;

    /// Destroy a command pool.
    fn destroy_command_pool(&self, pool: NativeHandle);

    /// Create a query pool.
    fn create_query_pool(&self, kind: QueryKind, count: u32)
    -> Result<NativeHandle, GraphicsError>;

    /// Destroy a query pool.
    fn destroy_query_pool(&self, pool: NativeHandle);

    /// Read back query results. Only valid once the writing work retired.
    fn query_results(
        &self,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, DriverStatus>;

    // ---- Recording ---------------------------------------------------------

    /// Begin recording. Secondaries pass the inherited render pass state.
    fn begin_command_buffer(
        &self,
        command_buffer: NativeHandle,
        inheritance: Option<&InheritanceInfo>,
    ) -> DriverStatus;

    /// Finish recording.
    fn end_command_buffer(&self, command_buffer: NativeHandle) -> DriverStatus;

    /// Reset a range of queries.
    fn cmd_reset_queries(&self, command_buffer: NativeHandle, pool: NativeHandle, first: u32, count: u32);

    /// Open a query region.
    fn cmd_begin_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32);

    /// Close a query region.
    fn cmd_end_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32);

    /// Write a timestamp once all previous commands completed.
    fn cmd_write_timestamp(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32);

    /// Begin dynamic rendering.
    fn cmd_begin_rendering(&self, command_buffer: NativeHandle, info: &RenderingInfo);

    /// End dynamic rendering.
    fn cmd_end_rendering(&self, command_buffer: NativeHandle);

    /// Begin an object-based render pass, creating or reusing its render pass
    /// and framebuffer objects.
    fn cmd_begin_render_pass(
        &self,
        command_buffer: NativeHandle,
        info: &RenderingInfo,
    ) -> Result<RenderPassObjects, GraphicsError>;

    /// End an object-based render pass.
    fn cmd_end_render_pass(&self, command_buffer: NativeHandle);

    /// Bind a pipeline.
    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle);

    /// Bind a descriptor set at `index` of the pipeline's layout.
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: NativeHandle,
        pipeline: NativeHandle,
        index: u32,
        set: NativeHandle,
    );

    /// Bind a vertex buffer.
    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: NativeHandle,
        slot: u32,
        buffer: NativeHandle,
        offset: u64,
    );

    /// Bind an index buffer.
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: NativeHandle,
        buffer: NativeHandle,
        offset: u64,
        format: IndexFormat,
    );

    /// Non-indexed draw.
    fn cmd_draw(&self, command_buffer: NativeHandle, vertices: Range<u32>, instances: Range<u32>);

    /// Indexed draw.
    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    );

    /// Compute dispatch.
    fn cmd_dispatch(&self, command_buffer: NativeHandle, x: u32, y: u32, z: u32);

    /// Buffer-to-buffer copy.
    fn cmd_copy_buffer(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        region: &BufferCopy,
    );

    /// Buffer-to-texture copy.
    fn cmd_copy_buffer_to_texture(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        region: &BufferTextureCopy,
    );

    /// Record transition barriers.
    fn cmd_barriers(&self, command_buffer: NativeHandle, barriers: &[Barrier]);

    /// Execute secondaries from inside the primary's render pass.
    fn cmd_execute_secondary(&self, command_buffer: NativeHandle, secondaries: &[NativeHandle]);

    // ---- Synchronization --------------------------------------------------

    /// Create a timeline semaphore.
    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeHandle, GraphicsError>;

    /// Create a binary semaphore.
    fn create_binary_semaphore(&self) -> Result<NativeHandle, GraphicsError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: NativeHandle);

    /// Value the GPU has reached on a timeline semaphore.
    fn timeline_value(&self, semaphore: NativeHandle) -> Result<u64, DriverStatus>;

    /// Block until a timeline semaphore reaches `value`. No timeout.
    fn wait_timeline(&self, semaphore: NativeHandle, value: u64) -> DriverStatus;

    /// Submit work to a queue.
    fn submit(&self, queue: QueueKind, info: &SubmitInfo) -> DriverStatus;

    /// Block until every queue is idle.
    fn wait_idle(&self) -> DriverStatus;

    // ---- Presentation -------------------------------------------------------

    /// Whether a presentation surface is attached.
    fn has_surface(&self) -> bool;

    /// Create a swapchain for the surface, retiring `old` if given.
    fn create_swapchain(&self, old: Option<NativeHandle>) -> Result<SwapchainInfo, GraphicsError>;

    /// Destroy a swapchain.
    fn destroy_swapchain(&self, swapchain: NativeHandle);

    /// Acquire the next image, signaling `signal` when it is ready.
    fn acquire_next_image(
        &self,
        swapchain: NativeHandle,
        signal: NativeHandle,
    ) -> Result<AcquiredImage, DriverStatus>;

    /// Queue an image for presentation after `wait` is signaled.
    fn present(&self, swapchain: NativeHandle, image_index: u32, wait: NativeHandle)
    -> DriverStatus;
}

/// Driver implementations that can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// No GPU, for tests and tools.
    Dummy,
    /// Native Vulkan.
    Vulkan,
}

/// Create a driver of the requested kind.
///
/// Falls back to the dummy driver when Vulkan is requested but unavailable
/// (feature disabled or no usable device). The Vulkan driver created here is
/// headless; attach a surface by constructing the driver directly.
pub fn create_driver(
    kind: DriverKind,
    config: &DeviceConfig,
) -> Result<Arc<dyn Driver>, GraphicsError> {
    if kind == DriverKind::Vulkan {
        #[cfg(feature = "vulkan-backend")]
        {
            match vulkan::VulkanDriver::new(config, None) {
                Ok(driver) => {
                    log::info!("Using Vulkan driver");
                    return Ok(Arc::new(driver));
                }
                Err(e) => {
                    log::warn!("Failed to create Vulkan driver: {}", e);
                }
            }
        }

        #[cfg(not(feature = "vulkan-backend"))]
        {
            let _ = config;
            log::warn!("Vulkan driver requested but the vulkan-backend feature is disabled");
        }
    }

    log::info!("Using dummy driver");
    Ok(Arc::new(DummyDriver::new()))
}

/// Check if a real GPU driver is compiled in.
pub fn has_gpu_driver() -> bool {
    cfg!(feature = "vulkan-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_handle_null() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle::from_raw(7).is_null());
        assert_eq!(NativeHandle::from_raw(255).to_string(), "0xff");
    }

    #[test]
    fn test_driver_status_classes() {
        assert!(DriverStatus::Success.is_success());
        assert!(DriverStatus::OutOfDate.is_stale_surface());
        assert!(DriverStatus::Suboptimal.is_stale_surface());
        assert!(!DriverStatus::DeviceLost.is_stale_surface());
        assert_eq!(DriverStatus::Unknown(-4).to_string(), "unknown status -4");
    }

    #[test]
    fn test_create_dummy_driver() {
        let driver = create_driver(DriverKind::Dummy, &DeviceConfig::default()).unwrap();
        assert_eq!(driver.name(), "Dummy");
    }
}
