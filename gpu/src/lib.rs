//! # RedLilium GPU
//!
//! Resource lifetime and command submission core of the RedLilium engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Creates resources and hands out command buffers
//! - [`Handle`] - Shared ownership of a resource; the last release defers
//!   destruction through the [`DeletionQueue`]
//! - [`CommandBufferManager`] - Fixed per-thread, per-frame command buffer budgets
//! - [`FrameCoordinator`] - Timeline-semaphore frame pacing, submission and present
//! - [`Driver`] - Trait for GPU API implementations: Vulkan (feature
//!   `vulkan-backend`) and Dummy (for testing)
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use redlilium_gpu::{
//!     BufferDescriptor, BufferUsage, DeviceConfig, DummyDriver, FrameCoordinator,
//!     GraphicsDevice,
//! };
//!
//! let device = GraphicsDevice::new(Arc::new(DummyDriver::new()), DeviceConfig::new(1, 2)).unwrap();
//! let mut frames = FrameCoordinator::new(device.clone()).unwrap();
//!
//! let staging = device.create_buffer(&BufferDescriptor::new(64, BufferUsage::COPY_SRC));
//! frames.new_frame();
//! let cb = device.get_command_buffer(frames.current_frame_index(), 0, true);
//! cb.end();
//! frames.queue_command_buffer(cb);
//! drop(staging); // destroyed once the GPU retired this frame
//! frames.present(None);
//! ```

pub mod command;
pub mod config;
pub mod deletion;
pub mod device;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handle;
pub mod pipeline_cache;
pub mod pools;
pub mod profiling;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use command::{
    AttachmentTarget, ColorAttachment, CommandBuffer, CommandBufferManager, DepthAttachment,
    RenderPassDescriptor,
};
pub use config::DeviceConfig;
pub use deletion::{DeletionEntry, DeletionQueue, ResourceKind};
pub use device::{DeviceLimits, GraphicsDevice};
pub use driver::{
    CommandBufferLevel, Driver, DriverKind, DriverStatus, DummyDriver, NativeHandle, QueueKind,
    create_driver, has_gpu_driver,
};
pub use error::GraphicsError;
pub use frame::{Backbuffer, FrameCoordinator, FrameCounters, FrameStats, GpuTimestamps};
pub use handle::Handle;
pub use pools::{PoolManager, PoolSlot};
pub use resources::{
    Buffer, DescriptorResource, DescriptorSet, DescriptorWrite, GpuResource, Pipeline, Sampler,
    Texture,
};
pub use types::*;

/// GPU library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device = GraphicsDevice::with_driver_kind(DriverKind::Dummy, DeviceConfig::default())
            .unwrap();
        assert_eq!(device.driver().name(), "Dummy");
        let frames = FrameCoordinator::new(Arc::clone(&device)).unwrap();
        assert_eq!(frames.absolute_frame_index(), 0);
    }
}
