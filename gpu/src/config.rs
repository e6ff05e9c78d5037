//! Device configuration.
//!
//! [`DeviceConfig`] is handed to [`GraphicsDevice::new`](crate::GraphicsDevice::new)
//! and frozen there: every pool, command buffer and semaphore is sized from it
//! once, so nothing can change after construction.
//!
//! # Example
//!
//! ```
//! use redlilium_gpu::DeviceConfig;
//!
//! let config = DeviceConfig::new(4, 3)
//!     .with_time_queries_per_frame(16)
//!     .with_dynamic_render_paths(false);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.pool_slot_count(), 12);
//! ```

use crate::error::GraphicsError;

/// Upper bound for [`DeviceConfig::max_frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Environment variable overriding [`DeviceConfig::num_threads`].
pub const ENV_THREADS: &str = "REDLILIUM_GPU_THREADS";
/// Environment variable overriding [`DeviceConfig::max_frames_in_flight`].
pub const ENV_FRAMES_IN_FLIGHT: &str = "REDLILIUM_GPU_FRAMES_IN_FLIGHT";
/// Environment variable overriding [`DeviceConfig::validation`].
pub const ENV_VALIDATION: &str = "REDLILIUM_GPU_VALIDATION";

/// Fixed configuration of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceConfig {
    /// Number of recording threads, each with its own pools per frame slot.
    pub num_threads: usize,
    /// Number of frames the CPU may run ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Timestamp queries available to each primary command buffer.
    pub time_queries_per_frame: u32,
    /// Use dynamic rendering instead of render pass + framebuffer objects.
    pub use_dynamic_render_paths: bool,
    /// Primary command buffers per (thread, frame) slot.
    pub primary_buffers_per_thread: u32,
    /// Secondary command buffers per (thread, frame) slot.
    pub secondary_buffers_per_thread: u32,
    /// Compute-queue command buffers per (thread, frame) slot.
    pub compute_buffers_per_thread: u32,
    /// Enable driver validation layers when available.
    pub validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            max_frames_in_flight: 2,
            time_queries_per_frame: 8,
            use_dynamic_render_paths: true,
            primary_buffers_per_thread: 4,
            secondary_buffers_per_thread: 8,
            compute_buffers_per_thread: 2,
            validation: cfg!(debug_assertions),
        }
    }
}

impl DeviceConfig {
    /// Create a configuration for `num_threads` recording threads and
    /// `max_frames_in_flight` frame slots, other values at their defaults.
    pub fn new(num_threads: usize, max_frames_in_flight: usize) -> Self {
        Self {
            num_threads,
            max_frames_in_flight,
            ..Default::default()
        }
    }

    /// Build the default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name.
    ///
    /// Unparsable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_THREADS) {
            match value.trim().parse() {
                Ok(threads) => self.num_threads = threads,
                Err(_) => log::warn!("Ignoring {ENV_THREADS}={value:?}: not a number"),
            }
        }
        if let Some(value) = lookup(ENV_FRAMES_IN_FLIGHT) {
            match value.trim().parse() {
                Ok(frames) => self.max_frames_in_flight = frames,
                Err(_) => log::warn!("Ignoring {ENV_FRAMES_IN_FLIGHT}={value:?}: not a number"),
            }
        }
        if let Some(value) = lookup(ENV_VALIDATION) {
            match value.trim() {
                "1" | "true" | "on" => self.validation = true,
                "0" | "false" | "off" => self.validation = false,
                _ => log::warn!("Ignoring {ENV_VALIDATION}={value:?}: expected 0/1"),
            }
        }
        self
    }

    /// Set the number of timestamp queries per primary command buffer.
    pub fn with_time_queries_per_frame(mut self, count: u32) -> Self {
        self.time_queries_per_frame = count;
        self
    }

    /// Select dynamic rendering or render pass objects.
    pub fn with_dynamic_render_paths(mut self, enabled: bool) -> Self {
        self.use_dynamic_render_paths = enabled;
        self
    }

    /// Set the per-slot command buffer budgets.
    pub fn with_command_buffer_budget(mut self, primary: u32, secondary: u32, compute: u32) -> Self {
        self.primary_buffers_per_thread = primary;
        self.secondary_buffers_per_thread = secondary;
        self.compute_buffers_per_thread = compute;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Number of (thread, frame) pool slots.
    pub fn pool_slot_count(&self) -> usize {
        self.num_threads * self.max_frames_in_flight
    }

    /// Check the configuration for values no device can be built from.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.num_threads == 0 {
            return Err(GraphicsError::InvalidParameter(
                "num_threads must be at least 1".to_string(),
            ));
        }
        if self.max_frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "max_frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(GraphicsError::InvalidParameter(format!(
                "max_frames_in_flight {} exceeds limit {}",
                self.max_frames_in_flight, MAX_FRAMES_IN_FLIGHT_LIMIT
            )));
        }
        if self.primary_buffers_per_thread == 0 {
            return Err(GraphicsError::InvalidParameter(
                "primary_buffers_per_thread must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_slot_count(), 2);
    }

    #[rstest]
    #[case::no_threads(DeviceConfig::new(0, 2))]
    #[case::no_frames(DeviceConfig::new(1, 0))]
    #[case::too_many_frames(DeviceConfig::new(1, MAX_FRAMES_IN_FLIGHT_LIMIT + 1))]
    #[case::no_primaries(DeviceConfig::new(1, 2).with_command_buffer_budget(0, 1, 1))]
    fn test_invalid_configs(#[case] config: DeviceConfig) {
        assert!(matches!(
            config.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = DeviceConfig::default().with_overrides(|key| match key {
            ENV_THREADS => Some("6".to_string()),
            ENV_FRAMES_IN_FLIGHT => Some(" 3 ".to_string()),
            ENV_VALIDATION => Some("off".to_string()),
            _ => None,
        });
        assert_eq!(config.num_threads, 6);
        assert_eq!(config.max_frames_in_flight, 3);
        assert!(!config.validation);
    }

    #[test]
    fn test_bad_override_is_ignored() {
        let config = DeviceConfig::new(2, 2).with_overrides(|key| {
            (key == ENV_THREADS).then(|| "many".to_string())
        });
        assert_eq!(config.num_threads, 2);
    }
}
