//! Descriptor set layouts.

use super::ShaderStages;

/// Kind of resource bound at a descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// Uniform buffer.
    UniformBuffer,
    /// Read/write storage buffer.
    StorageBuffer,
    /// Sampled texture.
    SampledTexture,
    /// Read/write storage texture.
    StorageTexture,
    /// Standalone sampler.
    Sampler,
    /// Texture and sampler in one binding.
    CombinedTextureSampler,
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// Binding number in the shader.
    pub binding: u32,
    /// Resource kind.
    pub ty: DescriptorType,
    /// Array length (1 for non-arrays).
    pub count: u32,
    /// Shader stages that read the binding.
    pub stages: ShaderStages,
}

impl DescriptorBinding {
    /// Create a single (non-array) binding.
    pub fn new(binding: u32, ty: DescriptorType, stages: ShaderStages) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
        }
    }
}

/// Descriptor for creating a descriptor set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorSetDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Layout of the set.
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetDescriptor {
    /// Create a descriptor set descriptor from its bindings.
    pub fn new(bindings: Vec<DescriptorBinding>) -> Self {
        Self {
            label: None,
            bindings,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Look up a binding by number.
    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}
