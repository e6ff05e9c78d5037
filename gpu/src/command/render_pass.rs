//! Render pass descriptions.

use crate::frame::Backbuffer;
use crate::handle::Handle;
use crate::resources::{GpuResource, Texture};
use crate::driver::{NativeAttachment, NativeTarget, RenderingInfo};
use crate::error::GraphicsError;
use crate::types::{ClearValue, Extent2d, LoadOp, StoreOp, TextureFormat};

/// Image a color attachment renders to.
#[derive(Debug, Clone)]
pub enum AttachmentTarget {
    /// A texture created through the device.
    Texture(Handle<Texture>),
    /// The swapchain image acquired for this frame.
    Backbuffer(Backbuffer),
}

impl AttachmentTarget {
    fn lower(&self) -> Result<(NativeTarget, TextureFormat, Extent2d), GraphicsError> {
        match self {
            Self::Texture(texture) => {
                let texture = texture.get().ok_or_else(|| {
                    GraphicsError::InvalidParameter("attachment with invalid texture".into())
                })?;
                Ok((
                    NativeTarget::Texture(texture.native()),
                    texture.format(),
                    texture.extent_2d(),
                ))
            }
            Self::Backbuffer(backbuffer) => Ok((
                NativeTarget::SwapchainImage(backbuffer.index()),
                backbuffer.format(),
                backbuffer.extent(),
            )),
        }
    }
}

/// A color attachment.
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    /// Rendered image.
    pub target: AttachmentTarget,
    /// Load operation.
    pub load: LoadOp,
    /// Store operation.
    pub store: StoreOp,
    /// Clear color used with [`LoadOp::Clear`].
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Clear to `color` and store.
    pub fn clear(target: AttachmentTarget, color: [f32; 4]) -> Self {
        Self {
            target,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear_color: color,
        }
    }

    /// Keep existing contents and store.
    pub fn load(target: AttachmentTarget) -> Self {
        Self {
            target,
            load: LoadOp::Load,
            store: StoreOp::Store,
            clear_color: [0.0; 4],
        }
    }
}

/// The depth attachment.
#[derive(Debug, Clone)]
pub struct DepthAttachment {
    /// Depth texture.
    pub texture: Handle<Texture>,
    /// Load operation.
    pub load: LoadOp,
    /// Store operation.
    pub store: StoreOp,
    /// Clear depth.
    pub clear_depth: f32,
    /// Clear stencil.
    pub clear_stencil: u32,
}

impl DepthAttachment {
    /// Clear to depth 1.0 and discard afterwards.
    pub fn clear(texture: Handle<Texture>) -> Self {
        Self {
            texture,
            load: LoadOp::Clear,
            store: StoreOp::DontCare,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

/// Description of a render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Color attachments.
    pub color: Vec<ColorAttachment>,
    /// Depth attachment.
    pub depth: Option<DepthAttachment>,
    /// The pass body is recorded in secondary command buffers.
    pub secondary_contents: bool,
}

impl RenderPassDescriptor {
    /// Create a pass with the given color attachments.
    pub fn new(color: Vec<ColorAttachment>) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the depth attachment.
    pub fn with_depth(mut self, depth: DepthAttachment) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Record the pass body in secondary command buffers.
    pub fn with_secondary_contents(mut self) -> Self {
        self.secondary_contents = true;
        self
    }

    /// Lower to native attachments. The render area is the smallest
    /// attachment extent.
    pub(crate) fn lower(&self) -> Result<RenderingInfo, GraphicsError> {
        let mut extent: Option<Extent2d> = None;
        let mut fit = |e: Extent2d| {
            extent = Some(match extent {
                Some(cur) => Extent2d::new(cur.width.min(e.width), cur.height.min(e.height)),
                None => e,
            });
        };

        let mut color = Vec::with_capacity(self.color.len());
        for attachment in &self.color {
            let (target, format, size) = attachment.target.lower()?;
            fit(size);
            color.push(NativeAttachment {
                target,
                format,
                load: attachment.load,
                store: attachment.store,
                clear: ClearValue::Color(attachment.clear_color),
            });
        }

        let depth = match &self.depth {
            Some(attachment) => {
                let texture = attachment.texture.get().ok_or_else(|| {
                    GraphicsError::InvalidParameter("depth attachment with invalid texture".into())
                })?;
                if !texture.format().is_depth_stencil() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "depth attachment has color format {:?}",
                        texture.format()
                    )));
                }
                fit(texture.extent_2d());
                Some(NativeAttachment {
                    target: NativeTarget::Texture(texture.native()),
                    format: texture.format(),
                    load: attachment.load,
                    store: attachment.store,
                    clear: ClearValue::DepthStencil {
                        depth: attachment.clear_depth,
                        stencil: attachment.clear_stencil,
                    },
                })
            }
            None => None,
        };

        let extent = extent.ok_or_else(|| {
            GraphicsError::InvalidParameter("render pass without attachments".into())
        })?;
        Ok(RenderingInfo {
            color,
            depth,
            extent,
            secondary_contents: self.secondary_contents,
        })
    }
}
