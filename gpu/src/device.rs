//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources
//! and getting command buffers to record into. It owns the driver, the
//! deletion queue every resource releases into, and the command buffer
//! manager.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{CommandBuffer, CommandBufferManager};
use crate::config::DeviceConfig;
use crate::deletion::{DeletionQueue, ResourceKind};
use crate::driver::{AllocationToken, Driver, DriverKind, NativeHandle, create_driver};
use crate::error::GraphicsError;
use crate::handle::Handle;
use crate::resources::{
    Buffer, DescriptorSet, DescriptorWrite, GpuResource, NativeResource, Pipeline, ResourceArray,
    Sampler, Texture,
};
use crate::types::{
    BufferDescriptor, DescriptorSetDescriptor, PipelineDescriptor, PipelineKind,
    SamplerDescriptor, ShaderStages, TextureDescriptor,
};

/// Limits resource creation is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Maximum sampler anisotropy.
    pub max_anisotropy: u16,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
            max_anisotropy: 16,
        }
    }
}

type PendingDescriptorUpdate = (Handle<DescriptorSet>, Vec<DescriptorWrite>);

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and shared across recording threads.
/// Each thread records only into command buffers of its own
/// `(frame, thread)` slot.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use redlilium_gpu::{
///     BufferDescriptor, BufferUsage, DeviceConfig, DummyDriver, GraphicsDevice,
/// };
///
/// let device = GraphicsDevice::new(Arc::new(DummyDriver::new()), DeviceConfig::default()).unwrap();
/// let buffer = device.create_buffer(&BufferDescriptor::new(256, BufferUsage::UNIFORM));
/// assert!(buffer.is_valid());
///
/// // Failures log and hand back an invalid handle.
/// let empty = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::UNIFORM));
/// assert!(!empty.is_valid());
/// ```
pub struct GraphicsDevice {
    driver: Arc<dyn Driver>,
    config: DeviceConfig,
    limits: DeviceLimits,
    deletion: Arc<DeletionQueue>,
    commands: CommandBufferManager,
    buffers: ResourceArray<Buffer>,
    textures: ResourceArray<Texture>,
    samplers: ResourceArray<Sampler>,
    pipelines: ResourceArray<Pipeline>,
    descriptor_sets: ResourceArray<DescriptorSet>,
    pending_descriptor_updates: Mutex<Vec<PendingDescriptorUpdate>>,
}

impl GraphicsDevice {
    /// Create a device on `driver`.
    ///
    /// Allocates every pool and command buffer the configuration asks for.
    pub fn new(driver: Arc<dyn Driver>, config: DeviceConfig) -> Result<Arc<Self>, GraphicsError> {
        config.validate()?;
        let commands = CommandBufferManager::new(driver.clone(), &config)?;

        log::info!(
            "GraphicsDevice: created on {} driver ({} threads, {} frames in flight, {} render paths)",
            driver.name(),
            config.num_threads,
            config.max_frames_in_flight,
            if config.use_dynamic_render_paths {
                "dynamic"
            } else {
                "object"
            }
        );

        Ok(Arc::new(Self {
            driver,
            config,
            limits: DeviceLimits::default(),
            deletion: Arc::new(DeletionQueue::new()),
            commands,
            buffers: ResourceArray::new(),
            textures: ResourceArray::new(),
            samplers: ResourceArray::new(),
            pipelines: ResourceArray::new(),
            descriptor_sets: ResourceArray::new(),
            pending_descriptor_updates: Mutex::new(Vec::new()),
        }))
    }

    /// Create the requested driver, falling back to the dummy driver, and a
    /// device on it.
    pub fn with_driver_kind(
        kind: DriverKind,
        config: DeviceConfig,
    ) -> Result<Arc<Self>, GraphicsError> {
        let driver = create_driver(kind, &config)?;
        Self::new(driver, config)
    }

    /// The driver.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The configuration the device was created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Creation limits.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// The queue released native objects wait in.
    pub fn deletion_queue(&self) -> &Arc<DeletionQueue> {
        &self.deletion
    }

    fn native(
        &self,
        kind: ResourceKind,
        handle: NativeHandle,
        allocation: Option<AllocationToken>,
    ) -> NativeResource {
        NativeResource::new(kind, handle, allocation, self.deletion.clone())
    }

    // ---- Resource creation ------------------------------------------------

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or exceeds device limits, or the
    /// driver fails to create it.
    pub fn try_create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<Handle<Buffer>, GraphicsError> {
        if descriptor.size > self.limits.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.limits.max_buffer_size
            )));
        }
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let (handle, allocation) = self.driver.create_buffer(descriptor)?;
        let buffer = self.buffers.insert_with(|id| {
            Buffer::new(
                id,
                self.native(ResourceKind::Buffer, handle, allocation),
                descriptor.clone(),
            )
        });

        log::trace!(
            "GraphicsDevice: created buffer {:?} {}, size={}",
            descriptor.label,
            buffer.id(),
            descriptor.size
        );
        Ok(Handle::from_arc(buffer))
    }

    /// Create a GPU buffer, or log and return an invalid handle.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Handle<Buffer> {
        or_invalid(
            self.try_create_buffer(descriptor),
            "buffer",
            &descriptor.label,
        )
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero or exceeds device limits, the
    /// mip count is zero, or the driver fails to create it.
    pub fn try_create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Handle<Texture>, GraphicsError> {
        let max_dim = self.limits.max_texture_dimension;
        let size = descriptor.size;
        if size.width > max_dim || size.height > max_dim || size.depth > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        if descriptor.mip_level_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture needs at least one mip level".to_string(),
            ));
        }

        let (handle, allocation) = self.driver.create_texture(descriptor)?;
        let texture = self.textures.insert_with(|id| {
            Texture::new(
                id,
                self.native(ResourceKind::Texture, handle, allocation),
                descriptor.clone(),
            )
        });

        log::trace!(
            "GraphicsDevice: created texture {:?} {}, size={}x{}",
            descriptor.label,
            texture.id(),
            size.width,
            size.height
        );
        Ok(Handle::from_arc(texture))
    }

    /// Create a GPU texture, or log and return an invalid handle.
    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Handle<Texture> {
        or_invalid(
            self.try_create_texture(descriptor),
            "texture",
            &descriptor.label,
        )
    }

    /// Create a texture sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if the anisotropy is out of range or the driver fails
    /// to create it.
    pub fn try_create_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<Handle<Sampler>, GraphicsError> {
        if descriptor.anisotropy_clamp == 0
            || descriptor.anisotropy_clamp > self.limits.max_anisotropy
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "anisotropy {} outside 1..={}",
                descriptor.anisotropy_clamp, self.limits.max_anisotropy
            )));
        }

        let handle = self.driver.create_sampler(descriptor)?;
        let sampler = self.samplers.insert_with(|id| {
            Sampler::new(
                id,
                self.native(ResourceKind::Sampler, handle, None),
                descriptor.clone(),
            )
        });

        log::trace!("GraphicsDevice: created sampler {:?} {}", descriptor.label, sampler.id());
        Ok(Handle::from_arc(sampler))
    }

    /// Create a texture sampler, or log and return an invalid handle.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Handle<Sampler> {
        or_invalid(
            self.try_create_sampler(descriptor),
            "sampler",
            &descriptor.label,
        )
    }

    /// Create a pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader stages do not match the pipeline kind
    /// or the driver fails to create it.
    pub fn try_create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<Handle<Pipeline>, GraphicsError> {
        match descriptor.kind {
            PipelineKind::Compute => {
                if descriptor.shaders.len() != 1
                    || descriptor.shader(ShaderStages::COMPUTE).is_none()
                {
                    return Err(GraphicsError::InvalidParameter(
                        "compute pipeline needs exactly one compute shader".to_string(),
                    ));
                }
            }
            PipelineKind::Graphics => {
                if descriptor.shader(ShaderStages::VERTEX).is_none() {
                    return Err(GraphicsError::InvalidParameter(
                        "graphics pipeline needs a vertex shader".to_string(),
                    ));
                }
                if descriptor.shader(ShaderStages::COMPUTE).is_some() {
                    return Err(GraphicsError::InvalidParameter(
                        "graphics pipeline cannot have a compute shader".to_string(),
                    ));
                }
            }
        }
        if let Some(module) = descriptor.shaders.iter().find(|m| m.spirv.is_empty()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} shader has no code",
                module.stage
            )));
        }

        let handle = self.driver.create_pipeline(descriptor)?;
        let pipeline = self.pipelines.insert_with(|id| {
            Pipeline::new(
                id,
                self.native(ResourceKind::Pipeline, handle, None),
                descriptor.clone(),
            )
        });

        log::trace!(
            "GraphicsDevice: created {:?} pipeline {:?} {}",
            descriptor.kind,
            descriptor.label,
            pipeline.id()
        );
        Ok(Handle::from_arc(pipeline))
    }

    /// Create a pipeline, or log and return an invalid handle.
    pub fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Handle<Pipeline> {
        or_invalid(
            self.try_create_pipeline(descriptor),
            "pipeline",
            &descriptor.label,
        )
    }

    /// Create a descriptor set with its layout.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding number repeats, a binding has a zero
    /// count, or the driver fails to create it.
    pub fn try_create_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Result<Handle<DescriptorSet>, GraphicsError> {
        for (i, binding) in descriptor.bindings.iter().enumerate() {
            if binding.count == 0 {
                return Err(GraphicsError::InvalidParameter(format!(
                    "binding {} has a zero count",
                    binding.binding
                )));
            }
            if descriptor.bindings[..i]
                .iter()
                .any(|other| other.binding == binding.binding)
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "binding {} declared twice",
                    binding.binding
                )));
            }
        }

        let handle = self.driver.create_descriptor_set(descriptor)?;
        let set = self.descriptor_sets.insert_with(|id| {
            DescriptorSet::new(
                id,
                self.native(ResourceKind::DescriptorSet, handle, None),
                descriptor.clone(),
            )
        });

        log::trace!(
            "GraphicsDevice: created descriptor set {:?} {} with {} bindings",
            descriptor.label,
            set.id(),
            descriptor.bindings.len()
        );
        Ok(Handle::from_arc(set))
    }

    /// Create a descriptor set, or log and return an invalid handle.
    pub fn create_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Handle<DescriptorSet> {
        or_invalid(
            self.try_create_descriptor_set(descriptor),
            "descriptor set",
            &descriptor.label,
        )
    }

    // ---- Descriptor updates -----------------------------------------------

    /// Queue writes into a descriptor set.
    ///
    /// Applied by the next
    /// [`FrameCoordinator::new_frame`](crate::FrameCoordinator::new_frame).
    /// The writes keep the bound resources alive until then.
    pub fn update_descriptor_set(&self, set: &Handle<DescriptorSet>, writes: Vec<DescriptorWrite>) {
        if !set.is_valid() {
            log::error!("GraphicsDevice: descriptor update on an invalid set, ignored");
            return;
        }
        if writes.is_empty() {
            return;
        }
        self.pending_descriptor_updates
            .lock()
            .push((set.clone(), writes));
    }

    /// Number of descriptor sets with queued writes.
    pub fn pending_descriptor_updates(&self) -> usize {
        self.pending_descriptor_updates.lock().len()
    }

    /// Hand queued descriptor writes to the driver.
    ///
    /// Writes that do not match the set's layout are logged and dropped.
    /// Returns the number of writes applied.
    pub(crate) fn apply_descriptor_updates(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending_descriptor_updates.lock());
        let mut applied = 0;
        for (set, writes) in pending {
            let Some(set) = set.get() else {
                continue;
            };
            let natives: Vec<_> = writes
                .iter()
                .filter_map(|write| match set.resolve_write(write) {
                    Ok(native) => Some(native),
                    Err(e) => {
                        log::error!(
                            "GraphicsDevice: dropping write to descriptor set {:?}: {}",
                            set.label(),
                            e
                        );
                        None
                    }
                })
                .collect();
            if !natives.is_empty() {
                self.driver.update_descriptor_set(set.native(), &natives);
                applied += natives.len();
            }
        }
        if applied > 0 {
            log::trace!("GraphicsDevice: applied {} descriptor writes", applied);
        }
        applied
    }

    // ---- Command buffers --------------------------------------------------

    /// The command buffer manager.
    pub fn command_buffers(&self) -> &CommandBufferManager {
        &self.commands
    }

    /// Next primary graphics buffer of `(frame, thread)`, begun if `begin`.
    ///
    /// # Panics
    ///
    /// Panics when the slot's primary budget is exhausted.
    #[track_caller]
    pub fn get_command_buffer(&self, frame: usize, thread: usize, begin: bool) -> Arc<CommandBuffer> {
        self.commands.get_command_buffer(frame, thread, begin)
    }

    /// Next secondary buffer of `(frame, thread)`.
    ///
    /// # Panics
    ///
    /// Panics when the slot's secondary budget is exhausted.
    #[track_caller]
    pub fn get_command_buffer_secondary(&self, frame: usize, thread: usize) -> Arc<CommandBuffer> {
        self.commands.get_command_buffer_secondary(frame, thread)
    }

    /// Next compute-queue buffer of `(frame, thread)`, begun if `begin`.
    ///
    /// # Panics
    ///
    /// Panics when the slot's compute budget is exhausted.
    #[track_caller]
    pub fn get_compute_command_buffer(
        &self,
        frame: usize,
        thread: usize,
        begin: bool,
    ) -> Arc<CommandBuffer> {
        self.commands.get_compute_command_buffer(frame, thread, begin)
    }

    // ---- Pipeline cache ---------------------------------------------------

    /// Seed the driver's pipeline cache.
    ///
    /// Blobs produced by another device or driver version are logged and
    /// ignored. Returns whether the blob was used.
    pub fn load_pipeline_cache(&self, data: &[u8]) -> bool {
        let identity = self.driver.identity();
        if !identity.accepts(data) {
            log::warn!(
                "GraphicsDevice: ignoring pipeline cache of {} bytes from another device",
                data.len()
            );
            return false;
        }
        match self.driver.load_pipeline_cache(data) {
            Ok(()) => {
                log::debug!("GraphicsDevice: loaded pipeline cache of {} bytes", data.len());
                true
            }
            Err(e) => {
                log::warn!("GraphicsDevice: pipeline cache rejected by driver: {}", e);
                false
            }
        }
    }

    /// Current pipeline cache contents, ready to be saved.
    pub fn pipeline_cache_data(&self) -> Vec<u8> {
        self.driver.pipeline_cache_data()
    }

    // ---- Bookkeeping ------------------------------------------------------

    /// Get the number of live buffers created by this device.
    pub fn buffer_count(&self) -> usize {
        self.buffers.live_count()
    }

    /// Get the number of live textures created by this device.
    pub fn texture_count(&self) -> usize {
        self.textures.live_count()
    }

    /// Get the number of live samplers created by this device.
    pub fn sampler_count(&self) -> usize {
        self.samplers.live_count()
    }

    /// Get the number of live pipelines created by this device.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.live_count()
    }

    /// Get the number of live descriptor sets created by this device.
    pub fn descriptor_set_count(&self) -> usize {
        self.descriptor_sets.live_count()
    }

    /// Recycle the array slots of released resources.
    pub fn cleanup_dead_resources(&self) -> usize {
        self.buffers.cleanup()
            + self.textures.cleanup()
            + self.samplers.cleanup()
            + self.pipelines.cleanup()
            + self.descriptor_sets.cleanup()
    }

    /// Block until the GPU is idle.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        let status = self.driver.wait_idle();
        if status.is_success() {
            Ok(())
        } else {
            Err(status.into())
        }
    }
}

fn or_invalid<T>(
    result: Result<Handle<T>, GraphicsError>,
    what: &str,
    label: &Option<String>,
) -> Handle<T> {
    result.unwrap_or_else(|e| {
        log::error!("GraphicsDevice: failed to create {} {:?}: {}", what, label, e);
        Handle::invalid()
    })
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("GraphicsDevice: wait_idle failed during shutdown: {}", e);
        }
        self.pending_descriptor_updates.get_mut().clear();
        self.deletion.flush(self.driver.as_ref());
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .field("limits", &self.limits)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::driver::dummy::DummyObjectKind;
    use crate::types::{
        BufferUsage, DescriptorBinding, DescriptorType, TextureFormat, TextureUsage,
    };

    fn create_test_device() -> (Arc<DummyDriver>, Arc<GraphicsDevice>) {
        let driver = Arc::new(DummyDriver::new());
        let device = GraphicsDevice::new(driver.clone(), DeviceConfig::default()).unwrap();
        (driver, device)
    }

    #[test]
    fn test_create_buffer() {
        let (_driver, device) = create_test_device();
        let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX));
        assert_eq!(buffer.size(), 1024);
        assert_eq!(device.buffer_count(), 1);
    }

    #[test]
    fn test_create_buffer_zero_size() {
        let (_driver, device) = create_test_device();
        let result = device.try_create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
        assert!(
            !device
                .create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX))
                .is_valid()
        );
    }

    #[test]
    fn test_driver_failure_gives_invalid_handle() {
        let (driver, device) = create_test_device();
        driver.fail_next_create();
        let texture = device.create_texture(&TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        assert!(!texture.is_valid());
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_create_texture_limits() {
        let (_driver, device) = create_test_device();
        let too_big = TextureDescriptor::new_2d(
            device.limits().max_texture_dimension + 1,
            1,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        );
        assert!(device.try_create_texture(&too_big).is_err());
        let no_mips = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        )
        .with_mip_levels(0);
        assert!(device.try_create_texture(&no_mips).is_err());
    }

    #[test]
    fn test_pipeline_stage_validation() {
        let (_driver, device) = create_test_device();
        let compute = PipelineDescriptor::compute(vec![0x0723_0203], Vec::new());
        assert!(device.try_create_pipeline(&compute).is_ok());

        let mut no_vertex =
            PipelineDescriptor::graphics(vec![1], vec![2], vec![TextureFormat::Rgba8Unorm]);
        no_vertex.shaders.remove(0);
        assert!(device.try_create_pipeline(&no_vertex).is_err());

        let empty = PipelineDescriptor::compute(Vec::new(), Vec::new());
        assert!(device.try_create_pipeline(&empty).is_err());
    }

    #[test]
    fn test_duplicate_descriptor_binding() {
        let (_driver, device) = create_test_device();
        let binding = DescriptorBinding::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX);
        let descriptor = DescriptorSetDescriptor::new(vec![binding, binding]);
        assert!(device.try_create_descriptor_set(&descriptor).is_err());
    }

    #[test]
    fn test_released_resource_waits_in_deletion_queue() {
        let (driver, device) = create_test_device();
        let buffer = device.create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE));
        let native = buffer.native();
        drop(buffer);

        assert_eq!(device.buffer_count(), 0);
        assert_eq!(device.deletion_queue().pending_count(), 1);
        assert_eq!(driver.destroy_count_of(native), 0);
        assert_eq!(device.cleanup_dead_resources(), 1);
    }

    #[test]
    fn test_descriptor_updates_are_deferred() {
        let (driver, device) = create_test_device();
        let set = device.create_descriptor_set(&DescriptorSetDescriptor::new(vec![
            DescriptorBinding::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX),
        ]));
        let buffer = device.create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM));
        device.update_descriptor_set(
            &set,
            vec![
                DescriptorWrite::buffer(0, &buffer),
                DescriptorWrite::buffer(5, &buffer),
            ],
        );
        assert!(driver.descriptor_writes().is_empty());
        assert_eq!(device.pending_descriptor_updates(), 1);

        // The queued write keeps the buffer alive.
        drop(buffer);
        assert_eq!(device.buffer_count(), 1);

        assert_eq!(device.apply_descriptor_updates(), 1);
        let writes = driver.descriptor_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, set.native());
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_pipeline_cache_identity_check() {
        let (_driver, device) = create_test_device();
        let mut blob = DummyDriver::IDENTITY.header().to_vec();
        blob.extend_from_slice(&[1, 2, 3]);
        assert!(device.load_pipeline_cache(&blob));
        assert_eq!(device.pipeline_cache_data(), blob);

        let mut foreign = blob.clone();
        foreign[8] ^= 0xff;
        assert!(!device.load_pipeline_cache(&foreign));
        assert!(!device.load_pipeline_cache(&[0; 4]));
        assert_eq!(device.pipeline_cache_data(), blob);
    }

    #[test]
    fn test_drop_flushes_pending_deletions() {
        let (driver, device) = create_test_device();
        let sampler = device.create_sampler(&SamplerDescriptor::linear());
        let native = sampler.native();
        drop(sampler);
        drop(device);
        assert_eq!(driver.destroy_count_of(native), 1);
        assert!(driver.destroy_count(DummyObjectKind::CommandPool) > 0);
    }
}
