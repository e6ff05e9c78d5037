//! Common utilities for frame core integration tests.
//!
//! Every test gets a fresh device and frame coordinator on the requested
//! driver. The dummy driver is also kept under its concrete type so tests
//! can inspect submissions, waits and destroy calls.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_gpu::{
    Buffer, BufferDescriptor, BufferUsage, DeviceConfig, Driver, DummyDriver, FrameCoordinator,
    GraphicsDevice, Handle,
};

/// Initialise test logging once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available drivers for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy driver (no actual GPU operations).
    Dummy,
    /// Vulkan driver (native via ash), headless.
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }

    /// Get the backend name for display.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Vulkan => "vulkan",
        }
    }

    fn create_driver(self, config: &DeviceConfig) -> Option<(Arc<dyn Driver>, Option<Arc<DummyDriver>>)> {
        match self {
            Backend::Dummy => {
                let dummy = Arc::new(DummyDriver::new());
                Some((dummy.clone(), Some(dummy)))
            }
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => {
                match redlilium_gpu::driver::vulkan::VulkanDriver::new(config, None) {
                    Ok(driver) => Some((Arc::new(driver), None)),
                    Err(e) => {
                        eprintln!("Vulkan driver unavailable: {e}");
                        None
                    }
                }
            }
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => {
                let _ = config;
                None
            }
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning a device and its frame coordinator.
pub struct TestContext {
    /// The backend being tested.
    pub backend: Backend,
    /// Frame coordinator. Declared first so it drops before the device.
    pub frames: FrameCoordinator,
    /// Graphics device for creating resources.
    pub device: Arc<GraphicsDevice>,
    dummy: Option<Arc<DummyDriver>>,
}

impl TestContext {
    /// Create a context with one recording thread and two frames in flight.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_config(backend, DeviceConfig::new(1, 2))
    }

    /// Create a context with an explicit configuration.
    pub fn with_config(backend: Backend, config: DeviceConfig) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }
        let (driver, dummy) = backend.create_driver(&config)?;
        let device = GraphicsDevice::new(driver, config).ok()?;
        let frames = FrameCoordinator::new(device.clone()).ok()?;
        Some(Self {
            backend,
            frames,
            device,
            dummy,
        })
    }

    /// The dummy driver, when testing against it.
    pub fn dummy(&self) -> Option<&Arc<DummyDriver>> {
        self.dummy.as_ref()
    }

    /// Create a buffer that must succeed.
    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Handle<Buffer> {
        let buffer = self
            .device
            .create_buffer(&BufferDescriptor::new(size, usage));
        assert!(buffer.is_valid(), "buffer creation failed on {}", self.backend.name());
        buffer
    }

    /// Run one frame that records and submits a single empty primary buffer.
    pub fn run_frame(&mut self) {
        self.frames.new_frame();
        let cb = self
            .device
            .get_command_buffer(self.frames.current_frame_index(), 0, true);
        cb.end();
        self.frames.queue_command_buffer(cb);
        self.frames.present(None);
    }

    /// Run `count` frames.
    pub fn run_frames(&mut self, count: usize) {
        for _ in 0..count {
            self.run_frame();
        }
    }
}
