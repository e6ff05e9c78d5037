//! Pipeline descriptors.
//!
//! Shaders arrive as SPIR-V words; compiling shading languages happens
//! elsewhere.

use bitflags::bitflags;

use super::{DescriptorBinding, TextureFormat};

bitflags! {
    /// Shader stage mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::empty()
    }
}

/// A compiled shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderModule {
    /// Stage this module runs in (exactly one bit).
    pub stage: ShaderStages,
    /// SPIR-V code.
    pub spirv: Vec<u32>,
    /// Entry point name.
    pub entry_point: String,
}

impl ShaderModule {
    /// Create a shader module with the conventional `main` entry point.
    pub fn new(stage: ShaderStages, spirv: Vec<u32>) -> Self {
        Self {
            stage,
            spirv,
            entry_point: "main".to_string(),
        }
    }
}

/// Graphics or compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineKind {
    /// Rasterization pipeline.
    #[default]
    Graphics,
    /// Compute pipeline.
    Compute,
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
    /// Independent lines.
    LineList,
    /// Points.
    PointList,
}

/// Vertex attribute element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One 32-bit float.
    Float32,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// Four normalized bytes.
    Unorm8x4,
    /// One 32-bit unsigned integer.
    Uint32,
}

/// One vertex attribute within a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Element format.
    pub format: VertexFormat,
    /// Byte offset within a vertex.
    pub offset: u32,
}

/// Layout of one bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexBufferLayout {
    /// Bytes between consecutive vertices.
    pub stride: u32,
    /// Attributes sourced from this buffer.
    pub attributes: Vec<VertexAttribute>,
}

/// Descriptor for creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Graphics or compute.
    pub kind: PipelineKind,
    /// Shader stages. Compute pipelines take exactly one compute module.
    pub shaders: Vec<ShaderModule>,
    /// Descriptor set layouts, by set index.
    pub set_layouts: Vec<Vec<DescriptorBinding>>,
    /// Push constant block size in bytes.
    pub push_constant_size: u32,
    /// Vertex buffer layouts, by binding slot.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Color attachment formats.
    pub color_formats: Vec<TextureFormat>,
    /// Depth attachment format.
    pub depth_format: Option<TextureFormat>,
}

impl PipelineDescriptor {
    /// Create a compute pipeline descriptor.
    pub fn compute(spirv: Vec<u32>, set_layouts: Vec<Vec<DescriptorBinding>>) -> Self {
        Self {
            kind: PipelineKind::Compute,
            shaders: vec![ShaderModule::new(ShaderStages::COMPUTE, spirv)],
            set_layouts,
            ..Default::default()
        }
    }

    /// Create a graphics pipeline descriptor rendering to `color_formats`.
    pub fn graphics(
        vertex: Vec<u32>,
        fragment: Vec<u32>,
        color_formats: Vec<TextureFormat>,
    ) -> Self {
        Self {
            kind: PipelineKind::Graphics,
            shaders: vec![
                ShaderModule::new(ShaderStages::VERTEX, vertex),
                ShaderModule::new(ShaderStages::FRAGMENT, fragment),
            ],
            color_formats,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the descriptor set layouts.
    pub fn with_set_layouts(mut self, set_layouts: Vec<Vec<DescriptorBinding>>) -> Self {
        self.set_layouts = set_layouts;
        self
    }

    /// Set the vertex buffer layouts.
    pub fn with_vertex_buffers(mut self, vertex_buffers: Vec<VertexBufferLayout>) -> Self {
        self.vertex_buffers = vertex_buffers;
        self
    }

    /// Set the depth attachment format.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Find the shader for a stage.
    pub fn shader(&self, stage: ShaderStages) -> Option<&ShaderModule> {
        self.shaders.iter().find(|s| s.stage == stage)
    }
}
