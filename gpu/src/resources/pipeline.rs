//! GPU pipeline resource.

use crate::deletion::ResourceKind;
use crate::driver::NativeHandle;
use crate::types::{PipelineDescriptor, PipelineKind};

use super::{GpuResource, NativeResource, ResourceId};

/// A compiled graphics or compute pipeline with its layout.
pub struct Pipeline {
    id: ResourceId,
    native: NativeResource,
    descriptor: PipelineDescriptor,
}

impl Pipeline {
    pub(crate) fn new(id: ResourceId, native: NativeResource, descriptor: PipelineDescriptor) -> Self {
        Self {
            id,
            native,
            descriptor,
        }
    }

    /// Get the pipeline descriptor.
    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    /// Graphics or compute.
    pub fn kind(&self) -> PipelineKind {
        self.descriptor.kind
    }

    /// Number of descriptor sets in the layout.
    pub fn set_count(&self) -> usize {
        self.descriptor.set_layouts.len()
    }
}

impl GpuResource for Pipeline {
    const KIND: ResourceKind = ResourceKind::Pipeline;

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

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("kind", &self.descriptor.kind)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
