//! Descriptor set resource and descriptor writes.
//!
//! Writes are queued on the device with
//! [`GraphicsDevice::update_descriptor_set`](crate::GraphicsDevice::update_descriptor_set)
//! and applied at the next [`FrameCoordinator::new_frame`](crate::FrameCoordinator::new_frame).
//! A queued write holds handles to the resources it binds, so they stay
//! alive until the write reached the driver.

use crate::deletion::ResourceKind;
use crate::driver::{NativeBinding, NativeDescriptorWrite, NativeHandle};
use crate::error::GraphicsError;
use crate::handle::Handle;
use crate::types::{DescriptorSetDescriptor, DescriptorType};

use super::{Buffer, GpuResource, NativeResource, ResourceId, Sampler, Texture};

/// A descriptor set together with its layout.
pub struct DescriptorSet {
    id: ResourceId,
    native: NativeResource,
    descriptor: DescriptorSetDescriptor,
}

impl DescriptorSet {
    pub(crate) fn new(
        id: ResourceId,
        native: NativeResource,
        descriptor: DescriptorSetDescriptor,
    ) -> Self {
        Self {
            id,
            native,
            descriptor,
        }
    }

    /// Get the layout descriptor.
    pub fn descriptor(&self) -> &DescriptorSetDescriptor {
        &self.descriptor
    }

    /// Check a write against the layout and lower it to native handles.
    pub(crate) fn resolve_write(
        &self,
        write: &DescriptorWrite,
    ) -> Result<NativeDescriptorWrite, GraphicsError> {
        let binding = self.descriptor.binding(write.binding).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "descriptor set {:?} has no binding {}",
                self.descriptor.label, write.binding
            ))
        })?;
        if write.array_element >= binding.count {
            return Err(GraphicsError::InvalidParameter(format!(
                "array element {} out of range for binding {} (count {})",
                write.array_element, write.binding, binding.count
            )));
        }
        if !write.resource.fits(binding.ty) {
            return Err(GraphicsError::InvalidParameter(format!(
                "binding {} is {:?}, cannot bind {}",
                write.binding,
                binding.ty,
                write.resource.kind_name()
            )));
        }
        Ok(NativeDescriptorWrite {
            binding: write.binding,
            array_element: write.array_element,
            ty: binding.ty,
            resource: write.resource.lower()?,
        })
    }
}

impl GpuResource for DescriptorSet {
    const KIND: ResourceKind = ResourceKind::DescriptorSet;

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

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSet")
            .field("id", &self.id)
            .field("bindings", &self.descriptor.bindings.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

/// Resource bound by a [`DescriptorWrite`].
#[derive(Debug, Clone)]
pub enum DescriptorResource {
    /// Range of a uniform or storage buffer.
    Buffer {
        /// The buffer.
        buffer: Handle<Buffer>,
        /// Start of the range.
        offset: u64,
        /// Size of the range.
        range: u64,
    },
    /// Sampled or storage texture.
    Texture(Handle<Texture>),
    /// Sampler.
    Sampler(Handle<Sampler>),
    /// Texture with its sampler.
    TextureSampler {
        /// The texture.
        texture: Handle<Texture>,
        /// The sampler.
        sampler: Handle<Sampler>,
    },
}

impl DescriptorResource {
    fn fits(&self, ty: DescriptorType) -> bool {
        match self {
            Self::Buffer { .. } => {
                matches!(ty, DescriptorType::UniformBuffer | DescriptorType::StorageBuffer)
            }
            Self::Texture(_) => {
                matches!(ty, DescriptorType::SampledTexture | DescriptorType::StorageTexture)
            }
            Self::Sampler(_) => ty == DescriptorType::Sampler,
            Self::TextureSampler { .. } => ty == DescriptorType::CombinedTextureSampler,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Buffer { .. } => "a buffer",
            Self::Texture(_) => "a texture",
            Self::Sampler(_) => "a sampler",
            Self::TextureSampler { .. } => "a texture/sampler pair",
        }
    }

    fn lower(&self) -> Result<NativeBinding, GraphicsError> {
        fn native<T: GpuResource>(handle: &Handle<T>) -> Result<NativeHandle, GraphicsError> {
            handle.get().map(T::native).ok_or_else(|| {
                GraphicsError::InvalidParameter("descriptor write with invalid handle".to_string())
            })
        }

        Ok(match self {
            Self::Buffer {
                buffer,
                offset,
                range,
            } => NativeBinding::Buffer {
                buffer: native(buffer)?,
                offset: *offset,
                range: *range,
            },
            Self::Texture(texture) => NativeBinding::Texture(native(texture)?),
            Self::Sampler(sampler) => NativeBinding::Sampler(native(sampler)?),
            Self::TextureSampler { texture, sampler } => NativeBinding::TextureSampler {
                texture: native(texture)?,
                sampler: native(sampler)?,
            },
        })
    }
}

/// One binding update of a descriptor set.
#[derive(Debug, Clone)]
pub struct DescriptorWrite {
    /// Binding number.
    pub binding: u32,
    /// Array element within the binding.
    pub array_element: u32,
    /// Bound resource.
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    /// Bind a whole buffer.
    pub fn buffer(binding: u32, buffer: &Handle<Buffer>) -> Self {
        let range = buffer.get().map_or(0, Buffer::size);
        Self::buffer_range(binding, buffer, 0, range)
    }

    /// Bind a range of a buffer.
    pub fn buffer_range(binding: u32, buffer: &Handle<Buffer>, offset: u64, range: u64) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::Buffer {
                buffer: buffer.clone(),
                offset,
                range,
            },
        }
    }

    /// Bind a texture.
    pub fn texture(binding: u32, texture: &Handle<Texture>) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::Texture(texture.clone()),
        }
    }

    /// Bind a sampler.
    pub fn sampler(binding: u32, sampler: &Handle<Sampler>) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::Sampler(sampler.clone()),
        }
    }

    /// Bind a texture with its sampler.
    pub fn texture_sampler(binding: u32, texture: &Handle<Texture>, sampler: &Handle<Sampler>) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: DescriptorResource::TextureSampler {
                texture: texture.clone(),
                sampler: sampler.clone(),
            },
        }
    }

    /// Target an array element of the binding.
    pub fn with_array_element(mut self, element: u32) -> Self {
        self.array_element = element;
        self
    }
}

static_assertions::assert_impl_all!(DescriptorSet: Send, Sync);
static_assertions::assert_impl_all!(DescriptorWrite: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deletion::DeletionQueue;
    use crate::resources::ResourceArray;
    use crate::types::{BufferDescriptor, BufferUsage, DescriptorBinding, ShaderStages};
    use std::sync::Arc;

    fn native(deletion: &Arc<DeletionQueue>, kind: ResourceKind, raw: u64) -> NativeResource {
        NativeResource::new(kind, NativeHandle::from_raw(raw), None, deletion.clone())
    }

    fn fixture(deletion: &Arc<DeletionQueue>) -> (Arc<DescriptorSet>, Handle<Buffer>) {
        let sets = ResourceArray::new();
        let set = sets.insert_with(|id| {
            DescriptorSet::new(
                id,
                native(deletion, ResourceKind::DescriptorSet, 1),
                DescriptorSetDescriptor::new(vec![DescriptorBinding::new(
                    0,
                    DescriptorType::UniformBuffer,
                    ShaderStages::VERTEX,
                )]),
            )
        });
        let buffers = ResourceArray::new();
        let buffer = Handle::from_arc(buffers.insert_with(|id| {
            Buffer::new(
                id,
                native(deletion, ResourceKind::Buffer, 2),
                BufferDescriptor::new(256, BufferUsage::UNIFORM),
            )
        }));
        (set, buffer)
    }

    #[test]
    fn test_resolve_buffer_write() {
        let deletion = Arc::new(DeletionQueue::new());
        let (set, buffer) = fixture(&deletion);
        let write = set.resolve_write(&DescriptorWrite::buffer(0, &buffer)).unwrap();
        assert_eq!(write.ty, DescriptorType::UniformBuffer);
        assert_eq!(
            write.resource,
            NativeBinding::Buffer {
                buffer: NativeHandle::from_raw(2),
                offset: 0,
                range: 256
            }
        );
    }

    #[test]
    fn test_resolve_rejects_bad_writes() {
        let deletion = Arc::new(DeletionQueue::new());
        let (set, buffer) = fixture(&deletion);
        assert!(set.resolve_write(&DescriptorWrite::buffer(3, &buffer)).is_err());
        assert!(
            set.resolve_write(&DescriptorWrite::buffer(0, &buffer).with_array_element(1))
                .is_err()
        );
        assert!(
            set.resolve_write(&DescriptorWrite::buffer(0, &Handle::invalid()))
                .is_err()
        );
    }
}
