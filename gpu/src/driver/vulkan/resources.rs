//! Resource creation: buffers, textures, samplers, pipelines, descriptor
//! sets, query pools and the pipeline cache.

use std::ffi::CString;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};

use crate::driver::{AllocationToken, DriverStatus, NativeBinding, NativeDescriptorWrite, NativeHandle, QueryKind};
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, BufferUsage, DescriptorBinding, DescriptorSetDescriptor, DescriptorType,
    PipelineDescriptor, PipelineKind, SamplerDescriptor, ShaderStages, TextureDescriptor,
};

use super::conversion::{
    aspect_mask, convert_address_mode, convert_buffer_usage, convert_compare_function,
    convert_descriptor_type, convert_filter_mode, convert_mipmap_filter_mode,
    convert_shader_stages, convert_texture_format, convert_texture_usage, convert_topology,
    convert_vertex_format, convert_result, creation_error,
};
use super::render_pass::RenderPassKey;
use super::{DescriptorSetRecord, PipelineRecord, TextureRecord, VulkanDriver, native, raw};

/// Sets per descriptor pool. A new pool is created when one runs out.
const DESCRIPTOR_POOL_MAX_SETS: u32 = 1024;

/// Counters recorded by pipeline statistics queries.
const STATISTICS_FLAGS: vk::QueryPipelineStatisticFlags = vk::QueryPipelineStatisticFlags::from_raw(
    vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS.as_raw()
        | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS.as_raw(),
);
const STATISTICS_VALUES: u32 = 3;

impl VulkanDriver {
    fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        let families = self.families.unique();
        if families.len() > 1 {
            (vk::SharingMode::CONCURRENT, families)
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        }
    }

    fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<gpu_allocator::vulkan::Allocation, GraphicsError> {
        let mut allocator = self.allocator.lock();
        let allocator = allocator
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("allocator already released".into()))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
                other => GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate {} memory: {}",
                    name, other
                )),
            })
    }

    pub(super) fn allocate_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        let location = if descriptor.usage.contains(BufferUsage::MAP_READ) {
            MemoryLocation::GpuToCpu
        } else if descriptor.usage.contains(BufferUsage::MAP_WRITE) {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let (sharing_mode, families) = self.sharing();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size.max(1))
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| creation_error("buffer", e))?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let allocation = match self.allocate_memory(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            if let Some(allocator) = self.allocator.lock().as_mut() {
                let _ = allocator.free(allocation);
            }
            return Err(creation_error("buffer memory binding", e));
        }

        let handle = native(buffer);
        self.allocations.lock().insert(handle.as_raw(), allocation);
        Ok((handle, Some(AllocationToken::from_raw(handle.as_raw()))))
    }

    pub(super) fn allocate_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<(NativeHandle, Option<AllocationToken>), GraphicsError> {
        let format = convert_texture_format(descriptor.format);
        let size = descriptor.size;
        let (image_type, view_type) = if size.depth > 1 {
            (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D)
        } else {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D)
        };

        let (sharing_mode, families) = self.sharing();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(image_type)
            .format(format)
            .extent(vk::Extent3D {
                width: size.width,
                height: size.height,
                depth: size.depth,
            })
            .mip_levels(descriptor.mip_level_count.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }
            .map_err(|e| creation_error("texture", e))?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let name = descriptor.label.as_deref().unwrap_or("texture");
        let allocation = match self.allocate_memory(name, requirements, MemoryLocation::GpuOnly, false)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let release = |allocation| {
            unsafe { self.device.destroy_image(image, None) };
            if let Some(allocator) = self.allocator.lock().as_mut() {
                let _ = allocator.free(allocation);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            release(allocation);
            return Err(creation_error("texture memory binding", e));
        }

        let aspect = aspect_mask(descriptor.format);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                release(allocation);
                return Err(creation_error("texture view", e));
            }
        };

        let handle = native(image);
        self.textures
            .write()
            .insert(handle.as_raw(), TextureRecord { image, view, aspect });
        self.allocations.lock().insert(handle.as_raw(), allocation);
        Ok((handle, Some(AllocationToken::from_raw(handle.as_raw()))))
    }

    pub(super) fn build_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        let anisotropy = self
            .max_anisotropy
            .map(|max| f32::from(descriptor.anisotropy_clamp).min(max))
            .filter(|clamp| *clamp > 1.0);

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.mag_filter))
            .min_filter(convert_filter_mode(descriptor.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(descriptor.mipmap_filter))
            .address_mode_u(convert_address_mode(descriptor.address_mode[0]))
            .address_mode_v(convert_address_mode(descriptor.address_mode[1]))
            .address_mode_w(convert_address_mode(descriptor.address_mode[2]))
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(descriptor.compare.is_some())
            .compare_op(
                descriptor
                    .compare
                    .map(convert_compare_function)
                    .unwrap_or(vk::CompareOp::ALWAYS),
            )
            .min_lod(0.0)
            .max_lod(descriptor.lod_max_clamp)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }
            .map_err(|e| creation_error("sampler", e))?;
        Ok(native(sampler))
    }

    fn create_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout, GraphicsError> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(convert_descriptor_type(binding.ty))
                    .descriptor_count(binding.count.max(1))
                    .stage_flags(convert_shader_stages(binding.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| creation_error("descriptor set layout", e))
    }

    pub(super) fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        let label = descriptor.label.as_deref().unwrap_or("pipeline");

        let mut set_layouts = Vec::with_capacity(descriptor.set_layouts.len());
        let destroy_set_layouts = |layouts: &[vk::DescriptorSetLayout]| {
            for layout in layouts {
                unsafe { self.device.destroy_descriptor_set_layout(*layout, None) };
            }
        };
        for bindings in &descriptor.set_layouts {
            match self.create_set_layout(bindings) {
                Ok(layout) => set_layouts.push(layout),
                Err(e) => {
                    destroy_set_layouts(&set_layouts);
                    return Err(e);
                }
            }
        }

        let push_constant_ranges: Vec<vk::PushConstantRange> = (descriptor.push_constant_size > 0)
            .then(|| {
                let stages = descriptor
                    .shaders
                    .iter()
                    .fold(ShaderStages::empty(), |acc, shader| acc | shader.stage);
                vk::PushConstantRange {
                    stage_flags: convert_shader_stages(stages),
                    offset: 0,
                    size: descriptor.push_constant_size,
                }
            })
            .into_iter()
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = match unsafe { self.device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                destroy_set_layouts(&set_layouts);
                return Err(creation_error("pipeline layout", e));
            }
        };

        let (pipeline, bind_point) = match self.create_pipeline_object(descriptor, layout) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                destroy_set_layouts(&set_layouts);
                return Err(e);
            }
        };
        log::debug!("Created {:?} pipeline '{}'", descriptor.kind, label);

        let handle = native(pipeline);
        self.pipelines.write().insert(
            handle.as_raw(),
            PipelineRecord {
                layout,
                set_layouts,
                bind_point,
            },
        );
        Ok(handle)
    }

    fn create_pipeline_object(
        &self,
        descriptor: &PipelineDescriptor,
        layout: vk::PipelineLayout,
    ) -> Result<(vk::Pipeline, vk::PipelineBindPoint), GraphicsError> {
        let mut modules = Vec::with_capacity(descriptor.shaders.len());
        let mut entry_points = Vec::with_capacity(descriptor.shaders.len());
        let destroy_modules = |modules: &[vk::ShaderModule]| {
            for module in modules {
                unsafe { self.device.destroy_shader_module(*module, None) };
            }
        };

        for shader in &descriptor.shaders {
            let entry = match CString::new(shader.entry_point.as_str()) {
                Ok(entry) => entry,
                Err(e) => {
                    destroy_modules(&modules);
                    return Err(GraphicsError::InvalidParameter(format!(
                        "Invalid entry point name (contains null byte): {}",
                        e
                    )));
                }
            };
            let create_info = vk::ShaderModuleCreateInfo::default().code(&shader.spirv);
            match unsafe { self.device.create_shader_module(&create_info, None) } {
                Ok(module) => {
                    modules.push(module);
                    entry_points.push(entry);
                }
                Err(e) => {
                    destroy_modules(&modules);
                    return Err(creation_error("shader module", e));
                }
            }
        }

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = descriptor
            .shaders
            .iter()
            .zip(&modules)
            .zip(&entry_points)
            .map(|((shader, module), entry)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(convert_shader_stages(shader.stage))
                    .module(*module)
                    .name(entry)
            })
            .collect();

        let result = match descriptor.kind {
            PipelineKind::Compute => self.create_compute_object(&stages, layout),
            PipelineKind::Graphics => self.create_graphics_object(descriptor, &stages, layout),
        };

        // Shader modules are baked into the pipeline.
        destroy_modules(&modules);
        result
    }

    fn create_compute_object(
        &self,
        stages: &[vk::PipelineShaderStageCreateInfo],
        layout: vk::PipelineLayout,
    ) -> Result<(vk::Pipeline, vk::PipelineBindPoint), GraphicsError> {
        let [stage] = stages else {
            return Err(GraphicsError::InvalidParameter(format!(
                "compute pipeline needs exactly one shader, got {}",
                stages.len()
            )));
        };
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(*stage)
            .layout(layout);
        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(self.pipeline_cache, &[create_info], None)
        }
        .map_err(|(_, e)| creation_error("compute pipeline", e))?;
        Ok((pipelines[0], vk::PipelineBindPoint::COMPUTE))
    }

    fn create_graphics_object(
        &self,
        descriptor: &PipelineDescriptor,
        stages: &[vk::PipelineShaderStageCreateInfo],
        layout: vk::PipelineLayout,
    ) -> Result<(vk::Pipeline, vk::PipelineBindPoint), GraphicsError> {
        let binding_descriptions: Vec<vk::VertexInputBindingDescription> = descriptor
            .vertex_buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| {
                vk::VertexInputBindingDescription::default()
                    .binding(index as u32)
                    .stride(buffer.stride)
                    .input_rate(vk::VertexInputRate::VERTEX)
            })
            .collect();

        let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = descriptor
            .vertex_buffers
            .iter()
            .enumerate()
            .flat_map(|(index, buffer)| {
                buffer.attributes.iter().map(move |attribute| {
                    vk::VertexInputAttributeDescription::default()
                        .location(attribute.location)
                        .binding(index as u32)
                        .format(convert_vertex_format(attribute.format))
                        .offset(attribute.offset)
                })
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(convert_topology(descriptor.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are set when a render pass begins.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(descriptor.depth_format.is_some())
            .depth_write_enable(descriptor.depth_format.is_some())
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = descriptor
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(false)
            })
            .collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = descriptor
            .color_formats
            .iter()
            .map(|format| convert_texture_format(*format))
            .collect();
        let depth_format = descriptor.depth_format.map(convert_texture_format);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format.unwrap_or(vk::Format::UNDEFINED));
        if descriptor
            .depth_format
            .is_some_and(|format| format.has_stencil())
        {
            rendering_info =
                rendering_info.stencil_attachment_format(depth_format.unwrap_or_default());
        }

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout);

        if self.use_dynamic_render_paths {
            create_info = create_info.push_next(&mut rendering_info);
        } else {
            let key = RenderPassKey::compatible(&color_formats, depth_format);
            let render_pass = self.render_passes.render_pass(&self.device, &key)?;
            create_info = create_info.render_pass(render_pass).subpass(0);
        }

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(self.pipeline_cache, &[create_info], None)
        }
        .map_err(|(_, e)| creation_error("graphics pipeline", e))?;
        Ok((pipelines[0], vk::PipelineBindPoint::GRAPHICS))
    }

    fn allocate_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorSet, vk::DescriptorPool), GraphicsError> {
        let layouts = [layout];
        let mut pools = self.descriptor_pools.lock();

        if let Some(&pool) = pools.last() {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { self.device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => return Ok((sets[0], pool)),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                    log::debug!("Vulkan: descriptor pool exhausted, creating another");
                }
                Err(e) => return Err(creation_error("descriptor set", e)),
            }
        }

        let pool = self.create_descriptor_pool()?;
        pools.push(pool);
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| creation_error("descriptor set", e))?;
        Ok((sets[0], pool))
    }

    fn create_descriptor_pool(&self) -> Result<vk::DescriptorPool, GraphicsError> {
        let pool_sizes = [
            (vk::DescriptorType::UNIFORM_BUFFER, 1024),
            (vk::DescriptorType::STORAGE_BUFFER, 256),
            (vk::DescriptorType::SAMPLED_IMAGE, 1024),
            (vk::DescriptorType::STORAGE_IMAGE, 256),
            (vk::DescriptorType::SAMPLER, 1024),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1024),
        ]
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        });

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(DESCRIPTOR_POOL_MAX_SETS)
            .pool_sizes(&pool_sizes);
        unsafe { self.device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| creation_error("descriptor pool", e))
    }

    pub(super) fn build_descriptor_set(
        &self,
        descriptor: &DescriptorSetDescriptor,
    ) -> Result<NativeHandle, GraphicsError> {
        let layout = self.create_set_layout(&descriptor.bindings)?;
        let (set, pool) = match self.allocate_set(layout) {
            Ok(allocated) => allocated,
            Err(e) => {
                unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
                return Err(e);
            }
        };
        let handle = native(set);
        self.descriptor_sets
            .lock()
            .insert(handle.as_raw(), DescriptorSetRecord { layout, pool });
        Ok(handle)
    }

    pub(super) fn write_descriptor_set(&self, set: NativeHandle, writes: &[NativeDescriptorWrite]) {
        enum Info {
            Buffer(usize),
            Image(usize),
        }

        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut entries = Vec::with_capacity(writes.len());

        for write in writes {
            let layout = if write.ty == DescriptorType::StorageTexture {
                vk::ImageLayout::GENERAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            let view = |texture: NativeHandle| {
                self.texture_record(texture)
                    .map(|record| record.view)
                    .unwrap_or_else(|| {
                        log::error!("Vulkan: descriptor write names unknown texture {}", texture);
                        vk::ImageView::null()
                    })
            };

            let info = match write.resource {
                NativeBinding::Buffer {
                    buffer,
                    offset,
                    range,
                } => {
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(raw(buffer))
                            .offset(offset)
                            .range(range),
                    );
                    Info::Buffer(buffer_infos.len() - 1)
                }
                NativeBinding::Texture(texture) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(view(texture))
                            .image_layout(layout),
                    );
                    Info::Image(image_infos.len() - 1)
                }
                NativeBinding::Sampler(sampler) => {
                    image_infos.push(vk::DescriptorImageInfo::default().sampler(raw(sampler)));
                    Info::Image(image_infos.len() - 1)
                }
                NativeBinding::TextureSampler { texture, sampler } => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .sampler(raw(sampler))
                            .image_view(view(texture))
                            .image_layout(layout),
                    );
                    Info::Image(image_infos.len() - 1)
                }
            };
            entries.push((write, info));
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = entries
            .iter()
            .map(|(write, info)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(raw(set))
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(convert_descriptor_type(write.ty));
                match info {
                    Info::Buffer(index) => {
                        base.buffer_info(std::slice::from_ref(&buffer_infos[*index]))
                    }
                    Info::Image(index) => {
                        base.image_info(std::slice::from_ref(&image_infos[*index]))
                    }
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
    }

    pub(super) fn build_query_pool(
        &self,
        kind: QueryKind,
        count: u32,
    ) -> Result<NativeHandle, GraphicsError> {
        if count == 0 {
            return Ok(NativeHandle::NULL);
        }
        let (create_info, values) = match kind {
            QueryKind::Timestamp => (
                vk::QueryPoolCreateInfo::default()
                    .query_type(vk::QueryType::TIMESTAMP)
                    .query_count(count),
                1,
            ),
            QueryKind::PipelineStatistics => {
                if !self.statistics_supported {
                    log::debug!("Vulkan: pipeline statistics unsupported, queries disabled");
                    return Ok(NativeHandle::NULL);
                }
                (
                    vk::QueryPoolCreateInfo::default()
                        .query_type(vk::QueryType::PIPELINE_STATISTICS)
                        .pipeline_statistics(STATISTICS_FLAGS)
                        .query_count(count),
                    STATISTICS_VALUES,
                )
            }
        };
        let pool = unsafe { self.device.create_query_pool(&create_info, None) }
            .map_err(|e| creation_error("query pool", e))?;
        let handle = native(pool);
        self.query_pools.write().insert(handle.as_raw(), values);
        Ok(handle)
    }

    pub(super) fn read_queries(
        &self,
        pool: NativeHandle,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, DriverStatus> {
        if pool.is_null() || count == 0 {
            return Ok(vec![0; count as usize]);
        }
        let values = self
            .query_pools
            .read()
            .get(&pool.as_raw())
            .copied()
            .unwrap_or(1);
        let stride = u64::from(values) * std::mem::size_of::<u64>() as u64;
        let mut data = vec![0u64; (count * values) as usize];
        let result = unsafe {
            (self.device.fp_v1_0().get_query_pool_results)(
                self.device.handle(),
                raw(pool),
                first,
                count,
                std::mem::size_of_val(data.as_slice()),
                data.as_mut_ptr().cast(),
                stride,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match result {
            vk::Result::SUCCESS => Ok(data),
            other => Err(convert_result(other)),
        }
    }

    pub(super) fn merge_pipeline_cache(&self, data: &[u8]) -> Result<(), GraphicsError> {
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(data);
        let loaded = unsafe { self.device.create_pipeline_cache(&create_info, None) }
            .map_err(|e| creation_error("pipeline cache", e))?;
        let merged = unsafe {
            self.device
                .merge_pipeline_caches(self.pipeline_cache, &[loaded])
        };
        unsafe { self.device.destroy_pipeline_cache(loaded, None) };
        merged.map_err(|e| creation_error("pipeline cache merge", e))?;
        log::info!("Vulkan: loaded {} byte pipeline cache", data.len());
        Ok(())
    }
}
