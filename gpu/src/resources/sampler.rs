//! GPU sampler resource.

use crate::deletion::ResourceKind;
use crate::driver::NativeHandle;
use crate::types::SamplerDescriptor;

use super::{GpuResource, NativeResource, ResourceId};

/// A GPU sampler resource.
pub struct Sampler {
    id: ResourceId,
    native: NativeResource,
    descriptor: SamplerDescriptor,
}

impl Sampler {
    pub(crate) fn new(id: ResourceId, native: NativeResource, descriptor: SamplerDescriptor) -> Self {
        Self {
            id,
            native,
            descriptor,
        }
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }
}

impl GpuResource for Sampler {
    const KIND: ResourceKind = ResourceKind::Sampler;

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

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("min_filter", &self.descriptor.min_filter)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
