//! Profiling support via Tracy.
//!
//! Instrumentation is enabled with the `profiling` Cargo feature:
//!
//! ```toml
//! [dependencies]
//! redlilium-gpu = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! The frame machinery uses these macros itself: [`FrameCoordinator::present`]
//! marks frame boundaries, [`FrameCoordinator::new_frame`] scopes its timeline
//! wait, and the number of frames in flight and pending deletions are
//! plotted. Nothing is recorded until the application starts a
//! [`Client`](tracy_client::Client).
//!
//! When profiling is disabled (the default), all macros compile to no-ops.
//!
//! [`FrameCoordinator::present`]: crate::FrameCoordinator::present
//! [`FrameCoordinator::new_frame`]: crate::FrameCoordinator::new_frame

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, Span, plot_name};

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.frame_mark();
        }
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span for the current scope.
///
/// # Example
///
/// ```ignore
/// fn flush() {
///     profile_scope!("flush_retired");
///     // ...
/// }
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|client| client.span_alloc(Some($name), module_path!(), file!(), line!(), 0));
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span for the entire function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|client| client.span_alloc(None, module_path!(), file!(), line!(), 0));
    };
}

/// Create a profiling span for function (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a value over time in Tracy.
///
/// ```ignore
/// profile_plot!("pending_deletions", queue.pending_count());
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.plot($crate::profiling::plot_name!($name), $value as f64);
        }
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        let _ = $value;
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_without_running_client() {
        crate::profile_function!();
        crate::profile_scope!("scope");
        crate::profile_plot!("value", 3usize);
        crate::frame_mark!();
    }
}
