//! Graphics error types.

use std::fmt;

use crate::driver::DriverStatus;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// The surface is outdated and needs to be reconfigured.
    SurfaceOutdated,
    /// The surface was lost and needs to be recreated.
    SurfaceLost,
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::SurfaceOutdated => write!(f, "surface outdated, needs reconfiguration"),
            Self::SurfaceLost => write!(f, "surface lost, needs recreation"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl From<DriverStatus> for GraphicsError {
    fn from(status: DriverStatus) -> Self {
        match status {
            DriverStatus::OutOfDate | DriverStatus::Suboptimal => Self::SurfaceOutdated,
            DriverStatus::SurfaceLost => Self::SurfaceLost,
            DriverStatus::DeviceLost => Self::DeviceLost,
            DriverStatus::OutOfDeviceMemory | DriverStatus::OutOfHostMemory => Self::OutOfMemory,
            other => Self::Internal(format!("driver returned {other}")),
        }
    }
}

/// Abort on a driver status that has no recovery path.
///
/// Stale surfaces are handled by the frame coordinator; every other
/// non-success status from submission, presentation or timeline waits ends
/// up here. The status is logged before panicking.
#[track_caller]
pub fn fatal_driver_error(context: &str, status: DriverStatus) -> ! {
    log::error!("{context}: unrecoverable driver error {status}");
    panic!("{context}: unrecoverable driver error {status}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_from_driver_status() {
        assert_eq!(
            GraphicsError::from(DriverStatus::OutOfDate),
            GraphicsError::SurfaceOutdated
        );
        assert_eq!(
            GraphicsError::from(DriverStatus::OutOfDeviceMemory),
            GraphicsError::OutOfMemory
        );
        assert_eq!(
            GraphicsError::from(DriverStatus::Unknown(-13)),
            GraphicsError::Internal("driver returned unknown status -13".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "unrecoverable driver error device lost")]
    fn test_fatal_driver_error_panics() {
        fatal_driver_error("submit", DriverStatus::DeviceLost);
    }
}
