//! Vulkan driver implementation via ash.
//!
//! Native objects cross the [`Driver`] seam as their raw Vulkan handle
//! values. Objects that need more than one Vulkan handle (textures and their
//! views, pipelines and their layouts, descriptor sets and their layouts and
//! pools, swapchains and their images) keep the rest in side tables keyed by
//! the primary handle.
//!
//! Memory is suballocated with `gpu-allocator`. Timeline semaphores and
//! dynamic rendering are required; a dedicated compute queue family is used
//! when the device has one.

mod conversion;
mod debug;
mod device;
mod instance;
mod recording;
mod render_pass;
mod resources;
mod swapchain;
mod sync;

use std::collections::HashMap;
use std::ffi::{CStr, c_char};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use ash::vk::Handle as VkHandle;
use gpu_allocator::vulkan::{Allocation, Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, RwLock};

use crate::config::DeviceConfig;
use crate::error::GraphicsError;
use crate::pipeline_cache::DeviceIdentity;
use crate::types::{
    BufferDescriptor, DescriptorSetDescriptor, Extent2d, IndexFormat, PipelineDescriptor,
    SamplerDescriptor, TextureDescriptor,
};

use super::{
    AcquiredImage, AllocationToken, Barrier, BufferCopy, BufferTextureCopy, CommandBufferLevel,
    Driver, DriverStatus, InheritanceInfo, NativeDescriptorWrite, NativeHandle, NativeTarget,
    QueryKind, QueueKind, RenderPassObjects, RenderingInfo, SubmitInfo, SwapchainInfo,
};

use conversion::{convert_index_format, convert_result, creation_error, status_of};
use device::QueueFamilies;
use render_pass::RenderPassCache;

/// Creates the presentation surface once the instance exists.
pub type SurfaceCreateFn =
    Box<dyn FnOnce(&ash::Entry, &ash::Instance) -> Result<vk::SurfaceKHR, GraphicsError>>;

/// Presentation surface handed to [`VulkanDriver::new`].
///
/// Window integration stays outside this crate: the caller names the
/// instance extensions its window system needs (for example from
/// `ash-window`) and creates the surface in the callback.
pub struct SurfaceSource {
    /// Instance extensions the surface requires.
    pub required_extensions: &'static [*const c_char],
    /// Surface constructor.
    pub create: SurfaceCreateFn,
    /// Size used when the surface does not dictate one.
    pub extent: Extent2d,
}

struct SurfaceState {
    loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    extent: Mutex<Extent2d>,
}

#[derive(Debug, Clone, Copy)]
struct TextureRecord {
    image: vk::Image,
    view: vk::ImageView,
    aspect: vk::ImageAspectFlags,
}

#[derive(Debug, Clone)]
struct PipelineRecord {
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    bind_point: vk::PipelineBindPoint,
}

#[derive(Debug, Clone, Copy)]
struct DescriptorSetRecord {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
}

#[derive(Debug, Clone)]
struct SwapchainRecord {
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

/// Vulkan driver.
pub struct VulkanDriver {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface: Option<SurfaceState>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    /// Serializes queue access; the two queues may be the same object.
    queue_lock: Mutex<()>,
    /// Taken in `Drop` so it is released before the device.
    allocator: Mutex<Option<Allocator>>,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
    identity: DeviceIdentity,
    timestamp_period: f32,
    max_anisotropy: Option<f32>,
    statistics_supported: bool,
    use_dynamic_render_paths: bool,
    pipeline_cache: vk::PipelineCache,
    allocations: Mutex<HashMap<u64, Allocation>>,
    textures: RwLock<HashMap<u64, TextureRecord>>,
    pipelines: RwLock<HashMap<u64, PipelineRecord>>,
    descriptor_sets: Mutex<HashMap<u64, DescriptorSetRecord>>,
    descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,
    /// Values each query of a pool produces.
    query_pools: RwLock<HashMap<u64, u32>>,
    render_passes: RenderPassCache,
    swapchains: RwLock<HashMap<u64, SwapchainRecord>>,
    /// Most recently created swapchain, the one `SwapchainImage` targets name.
    current_swapchain: AtomicU64,
}

/// Device-level objects created after the instance.
struct OpenedDevice {
    selected: device::SelectedDevice,
    device: ash::Device,
    allocator: Allocator,
    pipeline_cache: vk::PipelineCache,
}

fn raw<H: VkHandle>(handle: NativeHandle) -> H {
    H::from_raw(handle.as_raw())
}

fn native<H: VkHandle>(handle: H) -> NativeHandle {
    NativeHandle::from_raw(handle.as_raw())
}

impl VulkanDriver {
    /// Create a Vulkan driver, optionally presenting to a surface.
    pub fn new(config: &DeviceConfig, surface: Option<SurfaceSource>) -> Result<Self, GraphicsError> {
        log::info!("Initializing Vulkan driver");

        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan library: {}", e))
        })?;

        let extensions = surface.as_ref().map_or(&[][..], |s| s.required_extensions);
        let bundle = instance::create_instance(&entry, config.validation, extensions)?;

        let destroy_instance = |bundle: &instance::InstanceBundle| unsafe {
            if let (Some(utils), Some(messenger)) = (&bundle.debug_utils, bundle.debug_messenger)
            {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            bundle.instance.destroy_instance(None);
        };

        let surface = match surface {
            Some(source) => match (source.create)(&entry, &bundle.instance) {
                Ok(handle) => Some(SurfaceState {
                    loader: ash::khr::surface::Instance::new(&entry, &bundle.instance),
                    surface: handle,
                    extent: Mutex::new(source.extent),
                }),
                Err(e) => {
                    destroy_instance(&bundle);
                    return Err(e);
                }
            },
            None => None,
        };

        let opened = match Self::open_device(&bundle.instance, surface.as_ref()) {
            Ok(opened) => opened,
            Err(e) => {
                if let Some(surface) = &surface {
                    unsafe { surface.loader.destroy_surface(surface.surface, None) };
                }
                destroy_instance(&bundle);
                return Err(e);
            }
        };

        let OpenedDevice {
            selected,
            device,
            allocator,
            pipeline_cache,
        } = opened;
        let families = selected.families;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let compute_queue =
            unsafe { device.get_device_queue(families.compute, families.compute_index) };

        let properties = selected.properties;
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Vulkan driver initialized: {:?} (graphics family {}, compute family {}{})",
            device_name,
            families.graphics,
            families.compute,
            if families.shares_graphics_queue() {
                ", shared queue"
            } else {
                ""
            }
        );

        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(&bundle.instance, &device);
        let swapchain_loader = surface
            .as_ref()
            .map(|_| ash::khr::swapchain::Device::new(&bundle.instance, &device));

        Ok(Self {
            _entry: entry,
            instance: bundle.instance,
            debug_utils: bundle.debug_utils,
            debug_messenger: bundle.debug_messenger,
            surface,
            physical_device: selected.physical_device,
            device,
            families,
            graphics_queue,
            compute_queue,
            queue_lock: Mutex::new(()),
            allocator: Mutex::new(Some(allocator)),
            dynamic_rendering,
            swapchain_loader,
            identity: DeviceIdentity {
                vendor_id: properties.vendor_id,
                device_id: properties.device_id,
                cache_uuid: properties.pipeline_cache_uuid,
            },
            timestamp_period: properties.limits.timestamp_period,
            max_anisotropy: selected
                .features
                .sampler_anisotropy
                .then_some(properties.limits.max_sampler_anisotropy),
            statistics_supported: selected.features.pipeline_statistics,
            use_dynamic_render_paths: config.use_dynamic_render_paths,
            pipeline_cache,
            allocations: Mutex::new(HashMap::new()),
            textures: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
            descriptor_sets: Mutex::new(HashMap::new()),
            descriptor_pools: Mutex::new(Vec::new()),
            query_pools: RwLock::new(HashMap::new()),
            render_passes: RenderPassCache::default(),
            swapchains: RwLock::new(HashMap::new()),
            current_swapchain: AtomicU64::new(0),
        })
    }

    fn open_device(
        instance: &ash::Instance,
        surface: Option<&SurfaceState>,
    ) -> Result<OpenedDevice, GraphicsError> {
        let selected = device::select_physical_device(
            instance,
            surface.map(|s| (&s.loader, s.surface)),
        )?;
        let device = device::create_logical_device(instance, &selected, surface.is_some())?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: selected.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "Failed to create memory allocator: {}",
                    e
                )));
            }
        };

        let pipeline_cache = match unsafe {
            device.create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None)
        } {
            Ok(cache) => cache,
            Err(e) => {
                drop(allocator);
                unsafe { device.destroy_device(None) };
                return Err(creation_error("pipeline cache", e));
            }
        };

        Ok(OpenedDevice {
            selected,
            device,
            allocator,
            pipeline_cache,
        })
    }

    /// Update the size used for swapchains when the surface does not
    /// dictate one (for example Wayland). Takes effect on the next rebuild.
    pub fn set_surface_extent(&self, extent: Extent2d) {
        if let Some(surface) = &self.surface {
            *surface.extent.lock() = extent;
        }
    }

    /// The physical device in use.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics => self.graphics_queue,
            QueueKind::Compute => self.compute_queue,
        }
    }

    fn queue_family(&self, kind: QueueKind) -> u32 {
        match kind {
            QueueKind::Graphics => self.families.graphics,
            QueueKind::Compute => self.families.compute,
        }
    }

    fn texture_record(&self, texture: NativeHandle) -> Option<TextureRecord> {
        self.textures.read().get(&texture.as_raw()).copied()
    }

    fn swapchain_image(&self, index: u32) -> Option<(vk::Image, vk::ImageView)> {
        let current = self.current_swapchain.load(Ordering::Acquire);
        let swapchains = self.swapchains.read();
        let record = swapchains.get(&current)?;
        let index = index as usize;
        Some((*record.images.get(index)?, *record.views.get(index)?))
    }

    fn attachment_view(&self, target: NativeTarget) -> Option<vk::ImageView> {
        match target {
            NativeTarget::Texture(texture) => self.texture_record(texture).map(|t| t.view),
            NativeTarget::SwapchainImage(index) => self.swapchain_image(index).map(|(_, v)| v),
        }
    }

    fn free_allocation(&self, allocation: Option<AllocationToken>) {
        let Some(token) = allocation else {
            return;
        };
        let Some(allocation) = self.allocations.lock().remove(&token.as_raw()) else {
            log::warn!("Vulkan: unknown allocation {:#x}", token.as_raw());
            return;
        };
        if let Some(allocator) = self.allocator.lock().as_mut()
            && let Err(e) = allocator.free(allocation)
        {
            log::error!("Vulkan: failed to free allocation: {}", e);
        }
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan driver");
        unsafe {
            let _ = self.device.device_wait_idle();

            self.render_passes.destroy_all(&self.device);

            if let Some(loader) = &self.swapchain_loader {
                for (handle, record) in self.swapchains.write().drain() {
                    for view in record.views {
                        self.device.destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(vk::SwapchainKHR::from_raw(handle), None);
                }
            }

            let textures: Vec<_> = self.textures.write().drain().collect();
            if !textures.is_empty() {
                log::warn!("Vulkan: {} texture(s) still alive at shutdown", textures.len());
            }
            for (image, record) in textures {
                self.device.destroy_image_view(record.view, None);
                self.device.destroy_image(vk::Image::from_raw(image), None);
            }

            let pipelines: Vec<_> = self.pipelines.write().drain().collect();
            for (pipeline, record) in pipelines {
                self.device
                    .destroy_pipeline(vk::Pipeline::from_raw(pipeline), None);
                self.device.destroy_pipeline_layout(record.layout, None);
                for layout in record.set_layouts {
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
            }

            for (_, record) in self.descriptor_sets.lock().drain() {
                self.device.destroy_descriptor_set_layout(record.layout, None);
            }
            for pool in self.descriptor_pools.lock().drain(..) {
                self.device.destroy_descriptor_pool(pool, None);
            }

            self.device
                .destroy_pipeline_cache(self.pipeline_cache, None);

            let leaked: Vec<_> = self.allocations.lock().drain().collect();
            if !leaked.is_empty() {
                log::warn!("Vulkan: {} allocation(s) still alive at shutdown", leaked.len());
            }
            if let Some(mut allocator) = self.allocator.lock().take() {
                for (_, allocation) in leaked {
                    let _ = allocator.free(allocation);
                }
            }

            self.device.destroy_device(None);

            if let Some(surface) = &self.surface {
                surface.loader.destroy_surface(surface.surface, None);
            }
            if let (Some(utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl Driver for VulkanDriver {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn timestamp_period(&self) -> f32 {
        self.timestamp_period
    }

    // ---- Resources --------------------------------------------------------

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        self.allocate_buffer(descriptor)
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        self.allocate_texture(descriptor)
    }

    fn create_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.build_sampler(descriptor)
    }

    fn create_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.build_pipeline(descriptor)
    }

    fn create_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        self.build_descriptor_set(descriptor)
    }

    fn update_descriptor_set(&self, set: NativeHandle, writes: &[NativeDescriptorWrite]) {
        self.write_descriptor_set(set, writes);
    }

    fn destroy_buffer(&self, buffer: NativeHandle, allocation: Option<AllocationToken>) {
        unsafe { self.device.destroy_buffer(raw(buffer), None) };
        self.free_allocation(allocation);
    }

    fn destroy_texture(&self, texture: NativeHandle, allocation: Option<AllocationToken>) {
        if let Some(record) = self.textures.write().remove(&texture.as_raw()) {
            self.render_passes.evict_views(&self.device, &[record.view]);
            unsafe {
                self.device.destroy_image_view(record.view, None);
                self.device.destroy_image(record.image, None);
            }
        } else {
            log::warn!("Vulkan: destroy of unknown texture {}", texture);
        }
        self.free_allocation(allocation);
    }

    fn destroy_sampler(&self, sampler: NativeHandle) {
        unsafe { self.device.destroy_sampler(raw(sampler), None) };
    }

    fn destroy_pipeline(&self, pipeline: NativeHandle) {
        let Some(record) = self.pipelines.write().remove(&pipeline.as_raw()) else {
            log::warn!("Vulkan: destroy of unknown pipeline {}", pipeline);
            return;
        };
        unsafe {
            self.device.destroy_pipeline(raw(pipeline), None);
            self.device.destroy_pipeline_layout(record.layout, None);
            for layout in record.set_layouts {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }

    fn destroy_descriptor_set(&self, set: NativeHandle) {
        let Some(record) = self.descriptor_sets.lock().remove(&set.as_raw()) else {
            log::warn!("Vulkan: destroy of unknown descriptor set {}", set);
            return;
        };
        unsafe {
            if let Err(e) = self
                .device
                .free_descriptor_sets(record.pool, &[raw::<vk::DescriptorSet>(set)])
            {
                log::error!("Vulkan: failed to free descriptor set: {:?}", e);
            }
            self.device.destroy_descriptor_set_layout(record.layout, None);
        }
    }

    fn load_pipeline_cache(&self, data: &[u8]) -> Result<(), GraphicsError> {
        self.merge_pipeline_cache(data)
    }

    fn pipeline_cache_data(&self) -> Vec<u8> {
        match unsafe { self.device.get_pipeline_cache_data(self.pipeline_cache) } {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Vulkan: failed to read pipeline cache: {:?}", e);
                Vec::new()
            }
        }
    }

    // ---- Pools --------------------------------------------------------------

    fn create_command_pool(&self, queue: QueueKind) -> Result<NativeHandle, GraphicsError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(self.queue_family(queue));
        let pool = unsafe { self.device.create_command_pool(&create_info, None) }
            .map_err(|e| creation_error("command pool", e))?;
        Ok(native(pool))
    }

    fn allocate_command_buffers(
        &self,
        pool: NativeHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<NativeHandle>, GraphicsError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(raw(pool))
            .level(match level {
                CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
                CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
            })
            .command_buffer_count(count);
        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| creation_error("command buffers", e))?;
        Ok(buffers.into_iter().map(native).collect())
    }

    fn reset_command_pool(&self, pool: NativeHandle) -> DriverStatus {
        status_of(unsafe {
            self.device
                .reset_command_pool(raw(pool), vk::CommandPoolResetFlags::empty())
        })
    }

    fn destroy_command_pool(&self, pool: NativeHandle) {
        unsafe { self.device.destroy_command_pool(raw(pool), None) };
    }

    fn create_query_pool(
        &self,
        kind: QueryKind,
        count: u32,
    ) -> Result<NativeHandle, GraphicsError> {
        self.build_query_pool(kind, count)
    }

    fn destroy_query_pool(&self, pool: NativeHandle) {
        if pool.is_null() {
            return;
        }
        self.query_pools.write().remove(&pool.as_raw());
        unsafe { self.device.destroy_query_pool(raw(pool), None) };
    }

    fn query_results(
        &self,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, DriverStatus> {
        self.read_queries(pool, first, count)
    }

    // ---- Recording ---------------------------------------------------------

    fn begin_command_buffer(
        &self,
        command_buffer: NativeHandle,
        inheritance: Option<&InheritanceInfo>,
    ) -> DriverStatus {
        self.begin_recording(raw(command_buffer), inheritance)
    }

    fn end_command_buffer(&self, command_buffer: NativeHandle) -> DriverStatus {
        status_of(unsafe { self.device.end_command_buffer(raw(command_buffer)) })
    }

    fn cmd_reset_queries(
        &self,
        command_buffer: NativeHandle,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) {
        if pool.is_null() || count == 0 {
            return;
        }
        unsafe {
            self.device
                .cmd_reset_query_pool(raw(command_buffer), raw(pool), first, count)
        };
    }

    fn cmd_begin_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        if pool.is_null() {
            return;
        }
        unsafe {
            self.device.cmd_begin_query(
                raw(command_buffer),
                raw(pool),
                index,
                vk::QueryControlFlags::empty(),
            )
        };
    }

    fn cmd_end_query(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        if pool.is_null() {
            return;
        }
        unsafe {
            self.device
                .cmd_end_query(raw(command_buffer), raw(pool), index)
        };
    }

    fn cmd_write_timestamp(&self, command_buffer: NativeHandle, pool: NativeHandle, index: u32) {
        if pool.is_null() {
            return;
        }
        unsafe {
            self.device.cmd_write_timestamp(
                raw(command_buffer),
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                raw(pool),
                index,
            )
        };
    }

    fn cmd_begin_rendering(&self, command_buffer: NativeHandle, info: &RenderingInfo) {
        self.begin_dynamic_rendering(raw(command_buffer), info);
    }

    fn cmd_end_rendering(&self, command_buffer: NativeHandle) {
        unsafe {
            self.dynamic_rendering
                .cmd_end_rendering(raw(command_buffer))
        };
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: NativeHandle,
        info: &RenderingInfo,
    ) -> Result<RenderPassObjects, GraphicsError> {
        self.begin_render_pass_objects(raw(command_buffer), info)
    }

    fn cmd_end_render_pass(&self, command_buffer: NativeHandle) {
        unsafe { self.device.cmd_end_render_pass(raw(command_buffer)) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle) {
        let Some(bind_point) = self
            .pipelines
            .read()
            .get(&pipeline.as_raw())
            .map(|record| record.bind_point)
        else {
            log::error!("Vulkan: bind of unknown pipeline {}", pipeline);
            return;
        };
        unsafe {
            self.device
                .cmd_bind_pipeline(raw(command_buffer), bind_point, raw(pipeline))
        };
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: NativeHandle,
        pipeline: NativeHandle,
        index: u32,
        set: NativeHandle,
    ) {
        let Some((bind_point, layout)) = self
            .pipelines
            .read()
            .get(&pipeline.as_raw())
            .map(|record| (record.bind_point, record.layout))
        else {
            log::error!("Vulkan: descriptor bind against unknown pipeline {}", pipeline);
            return;
        };
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                raw(command_buffer),
                bind_point,
                layout,
                index,
                &[raw(set)],
                &[],
            )
        };
    }

    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: NativeHandle,
        slot: u32,
        buffer: NativeHandle,
        offset: u64,
    ) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                raw(command_buffer),
                slot,
                &[raw(buffer)],
                &[offset],
            )
        };
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: NativeHandle,
        buffer: NativeHandle,
        offset: u64,
        format: IndexFormat,
    ) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                raw(command_buffer),
                raw(buffer),
                offset,
                convert_index_format(format),
            )
        };
    }

    fn cmd_draw(&self, command_buffer: NativeHandle, vertices: Range<u32>, instances: Range<u32>) {
        unsafe {
            self.device.cmd_draw(
                raw(command_buffer),
                vertices.len() as u32,
                instances.len() as u32,
                vertices.start,
                instances.start,
            )
        };
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                raw(command_buffer),
                indices.len() as u32,
                instances.len() as u32,
                indices.start,
                base_vertex,
                instances.start,
            )
        };
    }

    fn cmd_dispatch(&self, command_buffer: NativeHandle, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(raw(command_buffer), x, y, z) };
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        region: &BufferCopy,
    ) {
        let region = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(raw(command_buffer), raw(src), raw(dst), &[region])
        };
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        command_buffer: NativeHandle,
        src: NativeHandle,
        dst: NativeHandle,
        region: &BufferTextureCopy,
    ) {
        self.copy_buffer_to_image(raw(command_buffer), raw(src), dst, region);
    }

    fn cmd_barriers(&self, command_buffer: NativeHandle, barriers: &[Barrier]) {
        self.record_barriers(raw(command_buffer), barriers);
    }

    fn cmd_execute_secondary(&self, command_buffer: NativeHandle, secondaries: &[NativeHandle]) {
        if secondaries.is_empty() {
            return;
        }
        let secondaries: Vec<vk::CommandBuffer> = secondaries.iter().map(|&cb| raw(cb)).collect();
        unsafe {
            self.device
                .cmd_execute_commands(raw(command_buffer), &secondaries)
        };
    }

    // ---- Synchronization --------------------------------------------------

    fn create_timeline_semaphore(&self, initial_value: u64) -> Result<NativeHandle, GraphicsError> {
        self.build_semaphore(Some(initial_value))
    }

    fn create_binary_semaphore(&self) -> Result<NativeHandle, GraphicsError> {
        self.build_semaphore(None)
    }

    fn destroy_semaphore(&self, semaphore: NativeHandle) {
        unsafe { self.device.destroy_semaphore(raw(semaphore), None) };
    }

    fn timeline_value(&self, semaphore: NativeHandle) -> Result<u64, DriverStatus> {
        unsafe { self.device.get_semaphore_counter_value(raw(semaphore)) }.map_err(convert_result)
    }

    fn wait_timeline(&self, semaphore: NativeHandle, value: u64) -> DriverStatus {
        self.wait_semaphore_value(raw(semaphore), value)
    }

    fn submit(&self, queue: QueueKind, info: &SubmitInfo) -> DriverStatus {
        self.submit_to_queue(queue, info)
    }

    fn wait_idle(&self) -> DriverStatus {
        status_of(unsafe { self.device.device_wait_idle() })
    }

    // ---- Presentation -------------------------------------------------------

    fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    fn create_swapchain(&self, old: Option<NativeHandle>) -> Result<SwapchainInfo, GraphicsError> {
        self.build_swapchain(old)
    }

    fn destroy_swapchain(&self, swapchain: NativeHandle) {
        self.release_swapchain(swapchain);
    }

    fn acquire_next_image(
        &self,
        swapchain: NativeHandle,
        signal: NativeHandle,
    ) -> Result<AcquiredImage, DriverStatus> {
        self.acquire_image(raw(swapchain), raw(signal))
    }

    fn present(
        &self,
        swapchain: NativeHandle,
        image_index: u32,
        wait: NativeHandle,
    ) -> DriverStatus {
        self.present_image(raw(swapchain), image_index, raw(wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_driver() -> Option<VulkanDriver> {
        let _ = env_logger::builder().is_test(true).try_init();
        match VulkanDriver::new(&DeviceConfig::new(1, 2), None) {
            Ok(driver) => Some(driver),
            Err(e) => {
                eprintln!("Skipping Vulkan test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_handle_conversion() {
        let buffer = vk::Buffer::from_raw(0xabc);
        let handle = native(buffer);
        assert_eq!(handle.as_raw(), 0xabc);
        assert_eq!(raw::<vk::Buffer>(handle), buffer);
        assert!(native(vk::Semaphore::null()).is_null());
    }

    #[test]
    fn test_headless_driver_has_no_surface() {
        let Some(driver) = create_driver() else {
            return;
        };
        assert_eq!(driver.name(), "Vulkan");
        assert!(!driver.has_surface());
        assert!(driver.create_swapchain(None).is_err());
    }

    #[test]
    fn test_timeline_semaphore_roundtrip() {
        let Some(driver) = create_driver() else {
            return;
        };
        let semaphore = driver.create_timeline_semaphore(3).unwrap();
        assert_eq!(driver.timeline_value(semaphore), Ok(3));
        assert_eq!(driver.wait_timeline(semaphore, 2), DriverStatus::Success);
        driver.destroy_semaphore(semaphore);
    }

    #[test]
    fn test_pipeline_cache_blob_carries_identity() {
        let Some(driver) = create_driver() else {
            return;
        };
        let data = driver.pipeline_cache_data();
        assert!(driver.identity().accepts(&data));
        assert!(driver.load_pipeline_cache(&data).is_ok());
    }
}
