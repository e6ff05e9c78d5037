//! Semaphores and queue submission.

use ash::vk;

use crate::driver::{DriverStatus, NativeHandle, QueueKind, SubmitInfo};
use crate::error::GraphicsError;

use super::conversion::{convert_wait_stage, creation_error, status_of};
use super::{VulkanDriver, native, raw};

impl VulkanDriver {
    /// Create a timeline semaphore when `timeline` holds its initial value,
    /// otherwise a binary one.
    pub(super) fn build_semaphore(&self, timeline: Option<u64>) -> Result<NativeHandle, GraphicsError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(timeline.unwrap_or(0));
        let mut create_info = vk::SemaphoreCreateInfo::default();
        if timeline.is_some() {
            create_info = create_info.push_next(&mut type_info);
        }
        let semaphore = unsafe { self.device.create_semaphore(&create_info, None) }
            .map_err(|e| creation_error("semaphore", e))?;
        Ok(native(semaphore))
    }

    pub(super) fn wait_semaphore_value(&self, semaphore: vk::Semaphore, value: u64) -> DriverStatus {
        let semaphores = [semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        status_of(unsafe { self.device.wait_semaphores(&wait_info, u64::MAX) })
    }

    pub(super) fn submit_to_queue(&self, queue: QueueKind, info: &SubmitInfo) -> DriverStatus {
        let command_buffers: Vec<vk::CommandBuffer> =
            info.command_buffers.iter().map(|&cb| raw(cb)).collect();
        let wait_semaphores: Vec<vk::Semaphore> =
            info.waits.iter().map(|wait| raw(wait.semaphore)).collect();
        let wait_values: Vec<u64> = info.waits.iter().map(|wait| wait.value).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = info
            .waits
            .iter()
            .map(|wait| convert_wait_stage(wait.stage))
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = info
            .signals
            .iter()
            .map(|signal| raw(signal.semaphore))
            .collect();
        let signal_values: Vec<u64> = info.signals.iter().map(|signal| signal.value).collect();

        // Binary semaphores ignore their entry in the value arrays.
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        let _queue_guard = self.queue_lock.lock();
        status_of(unsafe {
            self.device
                .queue_submit(self.queue(queue), &[submit_info], vk::Fence::null())
        })
    }
}
