//! Fixed-budget command buffer allocation per pool slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DeviceConfig;
use crate::driver::{CommandBufferLevel, Driver, NativeHandle, QueueKind};
use crate::error::GraphicsError;
use crate::pools::{PoolManager, PoolSlot};

use super::buffer::{CommandBuffer, QueryRanges};

#[derive(Debug, Default)]
struct SlotBuffers {
    primaries: Vec<Arc<CommandBuffer>>,
    secondaries: Vec<Arc<CommandBuffer>>,
    compute: Vec<Arc<CommandBuffer>>,
    next_primary: usize,
    next_secondary: usize,
    next_compute: usize,
}

#[derive(Debug, Clone, Copy)]
enum Budget {
    Primary,
    Secondary,
    Compute,
}

/// Hands out the pre-allocated command buffers of each pool slot.
///
/// All buffers are allocated when the manager is created. A slot's buffers
/// are handed out in order during a frame and become available again after
/// [`CommandBufferManager::reset_frame`].
pub struct CommandBufferManager {
    pools: PoolManager,
    slots: Vec<Mutex<SlotBuffers>>,
}

impl CommandBufferManager {
    /// Create the pools and allocate every slot's command buffers.
    pub fn new(driver: Arc<dyn Driver>, config: &DeviceConfig) -> Result<Self, GraphicsError> {
        let pools = PoolManager::new(driver.clone(), config)?;
        let mut slots = Vec::with_capacity(pools.slot_count());

        for frame in 0..config.max_frames_in_flight {
            for thread in 0..config.num_threads {
                let slot = PoolSlot::new(frame, thread);
                let thread_pools = *pools.pools(frame, thread);
                let make = |natives: Vec<NativeHandle>,
                            level: CommandBufferLevel,
                            queue: QueueKind,
                            with_queries: bool| {
                    natives
                        .into_iter()
                        .enumerate()
                        .map(|(index, native)| {
                            let index = index as u32;
                            let queries = with_queries.then(|| QueryRanges {
                                timestamp_pool: thread_pools.timestamps,
                                timestamps: pools.timestamp_range(index),
                                statistics_pool: thread_pools.statistics,
                                statistics_query: pools.statistics_query(index),
                            });
                            Arc::new(CommandBuffer::new(
                                driver.clone(),
                                native,
                                slot,
                                level,
                                queue,
                                index,
                                queries,
                                config.use_dynamic_render_paths,
                            ))
                        })
                        .collect::<Vec<_>>()
                };

                let primaries = driver.allocate_command_buffers(
                    thread_pools.graphics,
                    CommandBufferLevel::Primary,
                    config.primary_buffers_per_thread,
                )?;
                let secondaries = driver.allocate_command_buffers(
                    thread_pools.graphics,
                    CommandBufferLevel::Secondary,
                    config.secondary_buffers_per_thread,
                )?;
                let compute = driver.allocate_command_buffers(
                    thread_pools.compute,
                    CommandBufferLevel::Primary,
                    config.compute_buffers_per_thread,
                )?;

                slots.push(Mutex::new(SlotBuffers {
                    primaries: make(
                        primaries,
                        CommandBufferLevel::Primary,
                        QueueKind::Graphics,
                        true,
                    ),
                    secondaries: make(
                        secondaries,
                        CommandBufferLevel::Secondary,
                        QueueKind::Graphics,
                        false,
                    ),
                    compute: make(compute, CommandBufferLevel::Primary, QueueKind::Compute, false),
                    ..Default::default()
                }));
            }
        }

        log::debug!(
            "CommandBufferManager: {} slots x ({} primary, {} secondary, {} compute) buffers",
            slots.len(),
            config.primary_buffers_per_thread,
            config.secondary_buffers_per_thread,
            config.compute_buffers_per_thread
        );
        Ok(Self { pools, slots })
    }

    /// The pool manager.
    pub fn pools(&self) -> &PoolManager {
        &self.pools
    }

    #[track_caller]
    fn next(&self, frame: usize, thread: usize, budget: Budget) -> Arc<CommandBuffer> {
        let index = self.pools.pool_index(frame, thread);
        let mut slot = self.slots[index].lock();
        let slot = &mut *slot;
        let (buffers, next) = match budget {
            Budget::Primary => (&slot.primaries, &mut slot.next_primary),
            Budget::Secondary => (&slot.secondaries, &mut slot.next_secondary),
            Budget::Compute => (&slot.compute, &mut slot.next_compute),
        };
        let Some(cb) = buffers.get(*next) else {
            log::error!(
                "CommandBufferManager: {:?} budget of {} exhausted for frame {} thread {}",
                budget,
                buffers.len(),
                frame,
                thread
            );
            panic!("command buffer budget exceeded");
        };
        *next += 1;
        let cb = cb.clone();
        cb.mark_handed_out();
        cb
    }

    /// Next primary graphics buffer of `(frame, thread)`, begun if `begin`.
    ///
    /// # Panics
    ///
    /// Panics when the slot's primary budget is exhausted.
    #[track_caller]
    pub fn get_command_buffer(&self, frame: usize, thread: usize, begin: bool) -> Arc<CommandBuffer> {
        let cb = self.next(frame, thread, Budget::Primary);
        if begin {
            cb.begin();
        }
        cb
    }

    /// Next secondary buffer of `(frame, thread)`. Begin it with
    /// [`CommandBuffer::begin_secondary`].
    ///
    /// # Panics
    ///
    /// Panics when the slot's secondary budget is exhausted.
    #[track_caller]
    pub fn get_command_buffer_secondary(&self, frame: usize, thread: usize) -> Arc<CommandBuffer> {
        self.next(frame, thread, Budget::Secondary)
    }

    /// Next compute-queue buffer of `(frame, thread)`, begun if `begin`.
    ///
    /// # Panics
    ///
    /// Panics when the slot's compute budget is exhausted.
    #[track_caller]
    pub fn get_compute_command_buffer(
        &self,
        frame: usize,
        thread: usize,
        begin: bool,
    ) -> Arc<CommandBuffer> {
        let cb = self.next(frame, thread, Budget::Compute);
        if begin {
            cb.begin();
        }
        cb
    }

    /// Number of primaries handed out for `(frame, thread)` since the last
    /// reset.
    pub fn primaries_in_use(&self, frame: usize, thread: usize) -> usize {
        self.slots[self.pools.pool_index(frame, thread)]
            .lock()
            .next_primary
    }

    /// Reset every thread's pools and budgets for `frame`.
    ///
    /// Only valid once the GPU retired the slot's previous use.
    pub(crate) fn reset_frame(&self, frame: usize) {
        self.pools.reset_pools(frame);
        for thread in 0..self.pools.num_threads() {
            let mut slot = self.slots[self.pools.pool_index(frame, thread)].lock();
            let used = slot
                .primaries
                .iter()
                .take(slot.next_primary)
                .chain(slot.secondaries.iter().take(slot.next_secondary))
                .chain(slot.compute.iter().take(slot.next_compute));
            for cb in used {
                cb.reset_state();
            }
            slot.next_primary = 0;
            slot.next_secondary = 0;
            slot.next_compute = 0;
        }
    }
}

impl std::fmt::Debug for CommandBufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBufferManager")
            .field("pools", &self.pools)
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandBufferManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;

    fn manager(config: DeviceConfig) -> CommandBufferManager {
        CommandBufferManager::new(Arc::new(DummyDriver::new()), &config).unwrap()
    }

    #[test]
    fn test_buffers_handed_out_in_order() {
        let manager = manager(DeviceConfig::new(2, 2));
        let a = manager.get_command_buffer(1, 1, false);
        let b = manager.get_command_buffer(1, 1, true);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(a.slot(), PoolSlot::new(1, 1));
        assert!(b.is_recording());
        assert!(!a.is_recording());
        assert_eq!(manager.primaries_in_use(1, 1), 2);
        assert_eq!(manager.primaries_in_use(0, 1), 0);
    }

    #[test]
    fn test_budget_exhaustion_panics() {
        let manager = manager(DeviceConfig::new(1, 2).with_command_buffer_budget(2, 1, 1));
        manager.get_command_buffer(0, 0, false);
        manager.get_command_buffer(0, 0, false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            manager.get_command_buffer(0, 0, false)
        }));
        assert!(result.is_err());
        // The other frame slot is untouched.
        assert_eq!(manager.get_command_buffer(1, 0, false).index(), 0);
    }

    #[test]
    #[should_panic(expected = "command buffer budget exceeded")]
    fn test_secondary_budget() {
        let manager = manager(DeviceConfig::new(1, 1).with_command_buffer_budget(1, 1, 1));
        manager.get_command_buffer_secondary(0, 0);
        manager.get_command_buffer_secondary(0, 0);
    }

    #[test]
    fn test_reset_frame_reuses_the_same_buffers() {
        let manager = manager(DeviceConfig::new(1, 2));
        let first = manager.get_command_buffer(0, 0, true);
        let compute = manager.get_compute_command_buffer(0, 0, true);
        assert_eq!(compute.queue(), QueueKind::Compute);
        manager.reset_frame(0);
        assert!(!first.is_recording());

        let again = manager.get_command_buffer(0, 0, false);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.usage_count(), 2);
    }
}
