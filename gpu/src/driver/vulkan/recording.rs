//! Command recording that needs more than a one-line translation: begin
//! with inheritance, render passes on both paths, texture copies and
//! barriers.

use ash::vk;

use crate::driver::{
    Barrier, BufferTextureCopy, DriverStatus, InheritanceInfo, NativeAttachment, NativeHandle,
    RenderPassObjects, RenderingInfo,
};
use crate::error::GraphicsError;
use crate::types::{Extent2d, ResourceState};

use super::conversion::{
    aspect_mask, convert_clear_value, convert_load_op, convert_store_op, convert_texture_format,
    state_access, state_layout, state_stages, status_of,
};
use super::render_pass::{AttachmentKey, RenderPassKey};
use super::{VulkanDriver, native, raw};

const COLOR_LAYOUT: vk::ImageLayout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
const DEPTH_LAYOUT: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;

fn render_area(extent: Extent2d) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: extent.width,
            height: extent.height,
        },
    }
}

impl VulkanDriver {
    /// Full-target viewport and scissor; pipelines keep both dynamic.
    fn set_viewport(&self, command_buffer: vk::CommandBuffer, extent: Extent2d) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device
                .cmd_set_scissor(command_buffer, 0, &[render_area(extent)]);
        }
    }

    pub(super) fn begin_recording(
        &self,
        command_buffer: vk::CommandBuffer,
        inheritance: Option<&InheritanceInfo>,
    ) -> DriverStatus {
        let Some(inheritance) = inheritance else {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            return status_of(unsafe {
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
            });
        };

        let color_formats: Vec<vk::Format> = inheritance
            .color_formats
            .iter()
            .map(|format| convert_texture_format(*format))
            .collect();
        let depth_format = inheritance
            .depth_format
            .map(convert_texture_format)
            .unwrap_or(vk::Format::UNDEFINED);
        let mut rendering = vk::CommandBufferInheritanceRenderingInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        if inheritance.depth_format.is_some_and(|format| format.has_stencil()) {
            rendering = rendering.stencil_attachment_format(depth_format);
        }

        let mut inheritance_info = vk::CommandBufferInheritanceInfo::default().subpass(0);
        match inheritance.objects {
            Some(objects) => {
                inheritance_info = inheritance_info
                    .render_pass(raw(objects.render_pass))
                    .framebuffer(raw(objects.framebuffer));
            }
            None => {
                inheritance_info = inheritance_info.push_next(&mut rendering);
            }
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
                    | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
            )
            .inheritance_info(&inheritance_info);
        let status = status_of(unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
        });
        if status.is_success() {
            self.set_viewport(command_buffer, inheritance.extent);
        }
        status
    }

    fn rendering_attachment(
        &self,
        attachment: &NativeAttachment,
        layout: vk::ImageLayout,
        depth: bool,
    ) -> vk::RenderingAttachmentInfo<'static> {
        let view = self.attachment_view(attachment.target).unwrap_or_else(|| {
            log::error!("Vulkan: render pass names unknown target {:?}", attachment.target);
            vk::ImageView::null()
        });
        vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(layout)
            .load_op(convert_load_op(attachment.load))
            .store_op(convert_store_op(attachment.store))
            .clear_value(convert_clear_value(attachment.clear, depth))
    }

    pub(super) fn begin_dynamic_rendering(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &RenderingInfo,
    ) {
        let color: Vec<vk::RenderingAttachmentInfo> = info
            .color
            .iter()
            .map(|attachment| self.rendering_attachment(attachment, COLOR_LAYOUT, false))
            .collect();
        let depth = info
            .depth
            .as_ref()
            .map(|attachment| self.rendering_attachment(attachment, DEPTH_LAYOUT, true));
        let stencil = info
            .depth
            .as_ref()
            .filter(|attachment| attachment.format.has_stencil())
            .and(depth);

        let flags = if info.secondary_contents {
            vk::RenderingFlags::CONTENTS_SECONDARY_COMMAND_BUFFERS
        } else {
            vk::RenderingFlags::empty()
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .flags(flags)
            .render_area(render_area(info.extent))
            .layer_count(1)
            .color_attachments(&color);
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = stencil.as_ref() {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }

        unsafe {
            self.dynamic_rendering
                .cmd_begin_rendering(command_buffer, &rendering_info)
        };
        if !info.secondary_contents {
            self.set_viewport(command_buffer, info.extent);
        }
    }

    pub(super) fn begin_render_pass_objects(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &RenderingInfo,
    ) -> Result<RenderPassObjects, GraphicsError> {
        let attachment_key = |attachment: &NativeAttachment| AttachmentKey {
            format: convert_texture_format(attachment.format),
            load: convert_load_op(attachment.load),
            store: convert_store_op(attachment.store),
        };
        let key = RenderPassKey {
            color: info.color.iter().map(attachment_key).collect(),
            depth: info.depth.as_ref().map(attachment_key),
        };
        let render_pass = self.render_passes.render_pass(&self.device, &key)?;

        let views = info
            .color
            .iter()
            .chain(info.depth.as_ref())
            .map(|attachment| {
                self.attachment_view(attachment.target).ok_or_else(|| {
                    GraphicsError::InvalidParameter(format!(
                        "unknown render target {:?}",
                        attachment.target
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let area = render_area(info.extent);
        let framebuffer =
            self.render_passes
                .framebuffer(&self.device, render_pass, views, area.extent)?;

        let clear_values: Vec<vk::ClearValue> = info
            .color
            .iter()
            .map(|attachment| convert_clear_value(attachment.clear, false))
            .chain(
                info.depth
                    .as_ref()
                    .map(|attachment| convert_clear_value(attachment.clear, true)),
            )
            .collect();

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(&clear_values);
        let contents = if info.secondary_contents {
            vk::SubpassContents::SECONDARY_COMMAND_BUFFERS
        } else {
            vk::SubpassContents::INLINE
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &begin_info, contents)
        };
        if !info.secondary_contents {
            self.set_viewport(command_buffer, info.extent);
        }

        Ok(RenderPassObjects {
            render_pass: native(render_pass),
            framebuffer: native(framebuffer),
        })
    }

    pub(super) fn copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: NativeHandle,
        region: &BufferTextureCopy,
    ) {
        let Some(texture) = self.texture_record(dst) else {
            log::error!("Vulkan: copy into unknown texture {}", dst);
            return;
        };
        let copy = vk::BufferImageCopy::default()
            .buffer_offset(region.buffer_offset)
            .buffer_row_length(region.buffer_row_length)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: texture.aspect,
                mip_level: region.mip_level,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: region.extent.width,
                height: region.extent.height,
                depth: region.extent.depth,
            });
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                src,
                texture.image,
                state_layout(ResourceState::CopyDst),
                &[copy],
            )
        };
    }

    pub(super) fn record_barriers(&self, command_buffer: vk::CommandBuffer, barriers: &[Barrier]) {
        let mut buffer_barriers = Vec::new();
        let mut image_barriers = Vec::new();
        let mut src_stages = vk::PipelineStageFlags::empty();
        let mut dst_stages = vk::PipelineStageFlags::empty();

        let image_barrier = |image: vk::Image,
                             aspect: vk::ImageAspectFlags,
                             from: ResourceState,
                             to: ResourceState| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(state_access(from))
                .dst_access_mask(state_access(to))
                .old_layout(state_layout(from))
                .new_layout(state_layout(to))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                })
        };

        for barrier in barriers {
            match *barrier {
                Barrier::Buffer { buffer, from, to } => {
                    buffer_barriers.push(
                        vk::BufferMemoryBarrier::default()
                            .src_access_mask(state_access(from))
                            .dst_access_mask(state_access(to))
                            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .buffer(raw(buffer))
                            .offset(0)
                            .size(vk::WHOLE_SIZE),
                    );
                    src_stages |= state_stages(from, true);
                    dst_stages |= state_stages(to, false);
                }
                Barrier::Texture {
                    texture,
                    format,
                    from,
                    to,
                } => {
                    let Some(record) = self.texture_record(texture) else {
                        log::error!("Vulkan: barrier on unknown texture {}", texture);
                        continue;
                    };
                    image_barriers.push(image_barrier(record.image, aspect_mask(format), from, to));
                    src_stages |= state_stages(from, true);
                    dst_stages |= state_stages(to, false);
                }
                Barrier::SwapchainImage { index, from, to } => {
                    let Some((image, _)) = self.swapchain_image(index) else {
                        log::error!("Vulkan: barrier on unknown swapchain image {}", index);
                        continue;
                    };
                    image_barriers.push(image_barrier(
                        image,
                        vk::ImageAspectFlags::COLOR,
                        from,
                        to,
                    ));
                    src_stages |= state_stages(from, true);
                    dst_stages |= state_stages(to, false);
                }
            }
        }

        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            )
        };
    }
}
