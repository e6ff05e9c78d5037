//! GPU buffer resource.

use crate::deletion::ResourceKind;
use crate::driver::NativeHandle;
use crate::types::{BufferDescriptor, BufferUsage, ResourceState};

use super::{GpuResource, NativeResource, ResourceId, ResourceStateCell};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`](crate::GraphicsDevice::create_buffer)
/// and shared through [`Handle<Buffer>`](crate::Handle). The native buffer is
/// destroyed once the last handle is gone and the GPU retired the frame it
/// was released in.
///
/// # Example
///
/// ```
/// use redlilium_gpu::{BufferDescriptor, BufferUsage, DeviceConfig, DummyDriver, GraphicsDevice};
/// use std::sync::Arc;
///
/// let device = GraphicsDevice::new(Arc::new(DummyDriver::new()), DeviceConfig::default()).unwrap();
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX));
/// assert_eq!(buffer.size(), 1024);
/// ```
pub struct Buffer {
    id: ResourceId,
    native: NativeResource,
    descriptor: BufferDescriptor,
    state: ResourceStateCell,
}

impl Buffer {
    pub(crate) fn new(id: ResourceId, native: NativeResource, descriptor: BufferDescriptor) -> Self {
        Self {
            id,
            native,
            descriptor,
            state: ResourceStateCell::new(ResourceState::Undefined),
        }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Usage state recorded by the last transition.
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &ResourceStateCell {
        &self.state
    }
}

impl GpuResource for Buffer {
    const KIND: ResourceKind = ResourceKind::Buffer;

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

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deletion::DeletionQueue;
    use crate::resources::ResourceArray;
    use std::sync::Arc;

    fn make_buffer(deletion: &Arc<DeletionQueue>, size: u64) -> Arc<Buffer> {
        let array = ResourceArray::new();
        let native = NativeResource::new(
            ResourceKind::Buffer,
            NativeHandle::from_raw(size),
            None,
            deletion.clone(),
        );
        array.insert_with(|id| {
            Buffer::new(id, native, BufferDescriptor::new(size, BufferUsage::VERTEX))
        })
    }

    #[test]
    fn test_buffer_debug() {
        let deletion = Arc::new(DeletionQueue::new());
        let buffer = make_buffer(&deletion, 1024);
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_buffer_release_is_deferred() {
        let deletion = Arc::new(DeletionQueue::new());
        let buffer = make_buffer(&deletion, 2048);
        assert_eq!(buffer.size(), 2048);
        assert_eq!(buffer.state(), ResourceState::Undefined);
        drop(buffer);
        assert_eq!(deletion.pending_count(), 1);
        assert_eq!(deletion.pending_entries()[0].kind, ResourceKind::Buffer);
    }
}
