//! Command recording.
//!
//! Command buffers are allocated once per pool slot when the device is
//! created and handed out again every time their frame slot comes around.
//! Each slot has three fixed budgets: primaries, secondaries and
//! compute-queue buffers. Running out is a caller error.
//!
//! # Recording Flow
//!
//! ```text
//! get_command_buffer(frame, thread, begin = true)
//!   -> begin_render_pass / bind_* / draw* / dispatch / transition_*
//!   -> end()
//! FrameCoordinator::queue_command_buffer(cb)
//! FrameCoordinator::present(..)   closes queries, ends natively, submits
//! ```

mod buffer;
mod manager;
mod render_pass;

pub use buffer::CommandBuffer;
pub(crate) use buffer::TimestampSpan;
pub use manager::CommandBufferManager;
pub use render_pass::{AttachmentTarget, ColorAttachment, DepthAttachment, RenderPassDescriptor};
