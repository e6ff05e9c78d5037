//! GPU texture resource.

use crate::deletion::ResourceKind;
use crate::driver::NativeHandle;
use crate::types::{Extent2d, Extent3d, ResourceState, TextureDescriptor, TextureFormat, TextureUsage};

use super::{GpuResource, NativeResource, ResourceId, ResourceStateCell};

/// A GPU texture resource together with its default view.
pub struct Texture {
    id: ResourceId,
    native: NativeResource,
    descriptor: TextureDescriptor,
    state: ResourceStateCell,
}

impl Texture {
    pub(crate) fn new(id: ResourceId, native: NativeResource, descriptor: TextureDescriptor) -> Self {
        Self {
            id,
            native,
            descriptor,
            state: ResourceStateCell::new(ResourceState::Undefined),
        }
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Size of the first mip level as a render area.
    pub fn extent_2d(&self) -> Extent2d {
        self.descriptor.size.to_2d()
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Usage state recorded by the last transition.
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &ResourceStateCell {
        &self.state
    }
}

impl GpuResource for Texture {
    const KIND: ResourceKind = ResourceKind::Texture;

    fn id(&self) -> ResourceId {
        self.id
    }

    fn native(&self) -> NativeHandle {
        self.native.handle()
    }

    fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deletion::DeletionQueue;
    use crate::resources::ResourceArray;
    use std::sync::Arc;

    #[test]
    fn test_texture_accessors() {
        let deletion = Arc::new(DeletionQueue::new());
        let array = ResourceArray::new();
        let native = NativeResource::new(
            ResourceKind::Texture,
            NativeHandle::from_raw(3),
            None,
            deletion.clone(),
        );
        let texture = array.insert_with(|id| {
            Texture::new(
                id,
                native,
                TextureDescriptor::new_2d(
                    640,
                    480,
                    TextureFormat::Depth32Float,
                    TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label("depth"),
            )
        });
        assert_eq!(texture.extent_2d(), Extent2d::new(640, 480));
        assert!(texture.format().is_depth_stencil());
        assert_eq!(texture.label(), Some("depth"));
        assert_eq!(texture.native(), NativeHandle::from_raw(3));
    }
}
