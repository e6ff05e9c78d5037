//! Descriptors, formats and usage flags shared by the resource and
//! recording APIs.

mod buffer;
mod common;
mod descriptor;
mod pipeline;
mod render_pass;
mod sampler;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use common::{Extent2d, Extent3d};
pub use descriptor::{DescriptorBinding, DescriptorSetDescriptor, DescriptorType};
pub use pipeline::{
    PipelineDescriptor, PipelineKind, PrimitiveTopology, ShaderModule, ShaderStages,
    VertexAttribute, VertexBufferLayout, VertexFormat,
};
pub use render_pass::{ClearValue, LoadOp, StoreOp};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
