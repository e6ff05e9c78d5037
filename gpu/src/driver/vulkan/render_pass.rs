//! Render pass and framebuffer objects for the object-based render path.
//!
//! Render passes are keyed by attachment formats and load/store operations,
//! framebuffers by render pass, image views and extent. Both live until the
//! driver is dropped, except framebuffers whose views are destroyed.

use std::collections::HashMap;

use ash::vk;
use parking_lot::Mutex;

use crate::error::GraphicsError;

use super::conversion::creation_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentKey {
    pub format: vk::Format,
    pub load: vk::AttachmentLoadOp,
    pub store: vk::AttachmentStoreOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub color: Vec<AttachmentKey>,
    pub depth: Option<AttachmentKey>,
}

impl RenderPassKey {
    /// Key of a pass compatible with the given formats. Load and store
    /// operations do not affect compatibility.
    pub fn compatible(color: &[vk::Format], depth: Option<vk::Format>) -> Self {
        let key = |format| AttachmentKey {
            format,
            load: vk::AttachmentLoadOp::CLEAR,
            store: vk::AttachmentStoreOp::STORE,
        };
        Self {
            color: color.iter().copied().map(key).collect(),
            depth: depth.map(key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FramebufferKey {
    render_pass: vk::RenderPass,
    views: Vec<vk::ImageView>,
    width: u32,
    height: u32,
}

#[derive(Default)]
pub struct RenderPassCache {
    render_passes: Mutex<HashMap<RenderPassKey, vk::RenderPass>>,
    framebuffers: Mutex<HashMap<FramebufferKey, vk::Framebuffer>>,
}

impl RenderPassCache {
    /// Get or create the render pass for `key`.
    pub fn render_pass(
        &self,
        device: &ash::Device,
        key: &RenderPassKey,
    ) -> Result<vk::RenderPass, GraphicsError> {
        let mut passes = self.render_passes.lock();
        if let Some(&pass) = passes.get(key) {
            return Ok(pass);
        }

        let color_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let depth_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;

        let describe = |attachment: &AttachmentKey, layout| {
            vk::AttachmentDescription::default()
                .format(attachment.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(attachment.load)
                .store_op(attachment.store)
                .stencil_load_op(attachment.load)
                .stencil_store_op(attachment.store)
                .initial_layout(layout)
                .final_layout(layout)
        };

        let mut attachments: Vec<vk::AttachmentDescription> = key
            .color
            .iter()
            .map(|attachment| describe(attachment, color_layout))
            .collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..key.color.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: color_layout,
            })
            .collect();

        let depth_ref = key.depth.map(|depth| {
            attachments.push(describe(&depth, depth_layout));
            vk::AttachmentReference {
                attachment: key.color.len() as u32,
                layout: depth_layout,
            }
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        let pass = unsafe { device.create_render_pass(&create_info, None) }
            .map_err(|e| creation_error("render pass", e))?;
        log::debug!(
            "Created render pass {:?} for {} color attachment(s)",
            pass,
            key.color.len()
        );
        passes.insert(key.clone(), pass);
        Ok(pass)
    }

    /// Get or create a framebuffer binding `views` to `render_pass`.
    pub fn framebuffer(
        &self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
        views: Vec<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer, GraphicsError> {
        let key = FramebufferKey {
            render_pass,
            views,
            width: extent.width,
            height: extent.height,
        };
        let mut framebuffers = self.framebuffers.lock();
        if let Some(&framebuffer) = framebuffers.get(&key) {
            return Ok(framebuffer);
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&key.views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
            .map_err(|e| creation_error("framebuffer", e))?;
        framebuffers.insert(key, framebuffer);
        Ok(framebuffer)
    }

    /// Destroy every framebuffer that references one of `views`.
    ///
    /// Called when the views are destroyed, which only happens once the GPU
    /// retired all work using them.
    pub fn evict_views(&self, device: &ash::Device, views: &[vk::ImageView]) {
        self.framebuffers.lock().retain(|key, framebuffer| {
            let stale = key.views.iter().any(|view| views.contains(view));
            if stale {
                unsafe { device.destroy_framebuffer(*framebuffer, None) };
            }
            !stale
        });
    }

    /// Destroy all cached objects.
    pub fn destroy_all(&self, device: &ash::Device) {
        for (_, framebuffer) in self.framebuffers.lock().drain() {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
        for (_, pass) in self.render_passes.lock().drain() {
            unsafe { device.destroy_render_pass(pass, None) };
        }
    }
}
