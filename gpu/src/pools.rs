//! Per-thread, per-frame command and query pools.
//!
//! Each recording thread gets its own set of pools for every frame slot, so
//! threads never share a pool and a slot's pools can be reset wholesale
//! once the GPU retired the frame that last used them.
//!
//! ```text
//! pool_index = frame * num_threads + thread
//!
//!             thread 0   thread 1   thread 2
//! frame 0  [    0     |    1     |    2    ]
//! frame 1  [    3     |    4     |    5    ]
//! ```
//!
//! Every slot holds a graphics command pool, a compute command pool, a
//! timestamp query pool and a pipeline-statistics query pool. Primary
//! command buffer `i` of a slot owns timestamp queries
//! `[i * time_queries_per_frame, (i + 1) * time_queries_per_frame)` and
//! statistics query `i`.

use std::ops::Range;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::driver::{Driver, NativeHandle, QueryKind, QueueKind};
use crate::error::{GraphicsError, fatal_driver_error};

/// Identity of a per-thread-per-frame pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolSlot {
    /// Frame slot, `0..max_frames_in_flight`.
    pub frame: usize,
    /// Recording thread, `0..num_threads`.
    pub thread: usize,
}

impl PoolSlot {
    /// Create a slot identity.
    pub fn new(frame: usize, thread: usize) -> Self {
        Self { frame, thread }
    }

    /// Flat index of the slot for `num_threads` threads.
    pub fn index(self, num_threads: usize) -> usize {
        self.frame * num_threads + self.thread
    }
}

/// Pools owned by one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPools {
    /// Graphics command pool.
    pub graphics: NativeHandle,
    /// Compute command pool.
    pub compute: NativeHandle,
    /// Timestamp query pool, null when timestamps are disabled.
    pub timestamps: NativeHandle,
    /// Pipeline-statistics query pool.
    pub statistics: NativeHandle,
}

/// Owner of every slot's pools.
pub struct PoolManager {
    driver: Arc<dyn Driver>,
    num_threads: usize,
    max_frames_in_flight: usize,
    time_queries_per_frame: u32,
    slots: Vec<ThreadPools>,
}

impl PoolManager {
    /// Create the pools of all `num_threads * max_frames_in_flight` slots.
    pub fn new(driver: Arc<dyn Driver>, config: &DeviceConfig) -> Result<Self, GraphicsError> {
        config.validate()?;

        let mut manager = Self {
            driver,
            num_threads: config.num_threads,
            max_frames_in_flight: config.max_frames_in_flight,
            time_queries_per_frame: config.time_queries_per_frame,
            slots: Vec::with_capacity(config.pool_slot_count()),
        };

        // Pools created before a failure are released by Drop.
        for _ in 0..config.pool_slot_count() {
            let slot = manager.create_slot(config)?;
            manager.slots.push(slot);
        }

        log::debug!(
            "PoolManager: created {} pool slots ({} threads x {} frames)",
            manager.slots.len(),
            manager.num_threads,
            manager.max_frames_in_flight
        );
        Ok(manager)
    }

    fn create_slot(&self, config: &DeviceConfig) -> Result<ThreadPools, GraphicsError> {
        let mut pools = ThreadPools {
            graphics: NativeHandle::NULL,
            compute: NativeHandle::NULL,
            timestamps: NativeHandle::NULL,
            statistics: NativeHandle::NULL,
        };
        let result = (|| -> Result<(), GraphicsError> {
            pools.graphics = self.driver.create_command_pool(QueueKind::Graphics)?;
            pools.compute = self.driver.create_command_pool(QueueKind::Compute)?;
            let timestamp_count = config.primary_buffers_per_thread * config.time_queries_per_frame;
            if timestamp_count > 0 {
                pools.timestamps = self
                    .driver
                    .create_query_pool(QueryKind::Timestamp, timestamp_count)?;
            }
            pools.statistics = self.driver.create_query_pool(
                QueryKind::PipelineStatistics,
                config.primary_buffers_per_thread,
            )?;
            Ok(())
        })();
        match result {
            Ok(()) => Ok(pools),
            Err(e) => {
                self.destroy_slot(&pools);
                Err(e)
            }
        }
    }

    fn destroy_slot(&self, pools: &ThreadPools) {
        for pool in [pools.graphics, pools.compute] {
            if !pool.is_null() {
                self.driver.destroy_command_pool(pool);
            }
        }
        for pool in [pools.timestamps, pools.statistics] {
            if !pool.is_null() {
                self.driver.destroy_query_pool(pool);
            }
        }
    }

    /// Flat index of `(frame, thread)`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    #[track_caller]
    pub fn pool_index(&self, frame: usize, thread: usize) -> usize {
        if frame >= self.max_frames_in_flight || thread >= self.num_threads {
            log::error!(
                "PoolManager: slot (frame {}, thread {}) out of range ({} frames, {} threads)",
                frame,
                thread,
                self.max_frames_in_flight,
                self.num_threads
            );
            panic!("pool slot (frame {frame}, thread {thread}) out of range");
        }
        PoolSlot::new(frame, thread).index(self.num_threads)
    }

    /// Pools of `(frame, thread)`.
    #[track_caller]
    pub fn pools(&self, frame: usize, thread: usize) -> &ThreadPools {
        &self.slots[self.pool_index(frame, thread)]
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of recording threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Number of frame slots.
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Timestamp queries owned by primary command buffer `primary_index`.
    pub fn timestamp_range(&self, primary_index: u32) -> Range<u32> {
        let first = primary_index * self.time_queries_per_frame;
        first..first + self.time_queries_per_frame
    }

    /// Statistics query owned by primary command buffer `primary_index`.
    pub fn statistics_query(&self, primary_index: u32) -> u32 {
        primary_index
    }

    /// Reset the command pools of every thread for `frame`.
    ///
    /// Must only be called once the GPU retired the slot's previous use.
    #[track_caller]
    pub fn reset_pools(&self, frame: usize) {
        for thread in 0..self.num_threads {
            let pools = self.pools(frame, thread);
            for pool in [pools.graphics, pools.compute] {
                let status = self.driver.reset_command_pool(pool);
                if !status.is_success() {
                    fatal_driver_error("PoolManager: reset_command_pool", status);
                }
            }
        }
        log::trace!("PoolManager: reset pools of frame slot {}", frame);
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        for pools in &self.slots {
            self.destroy_slot(pools);
        }
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("num_threads", &self.num_threads)
            .field("max_frames_in_flight", &self.max_frames_in_flight)
            .field("slots", &self.slots.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(PoolManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::driver::dummy::DummyObjectKind;
    use std::collections::HashSet;

    fn manager(threads: usize, frames: usize) -> (Arc<DummyDriver>, PoolManager) {
        let driver = Arc::new(DummyDriver::new());
        let manager = PoolManager::new(driver.clone(), &DeviceConfig::new(threads, frames)).unwrap();
        (driver, manager)
    }

    #[test]
    fn test_indices_for_two_by_two() {
        let (_driver, manager) = manager(2, 2);
        let indices: Vec<_> = (0..2)
            .flat_map(|frame| (0..2).map(move |thread| (frame, thread)))
            .map(|(frame, thread)| manager.pool_index(frame, thread))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_indices_are_unique() {
        for threads in 1..=4 {
            for frames in 1..=4 {
                let seen: HashSet<_> = (0..frames)
                    .flat_map(|f| (0..threads).map(move |t| PoolSlot::new(f, t).index(threads)))
                    .collect();
                assert_eq!(seen.len(), threads * frames);
                assert!(seen.iter().all(|&i| i < threads * frames));
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_thread_panics() {
        let (_driver, manager) = manager(2, 2);
        manager.pool_index(0, 2);
    }

    #[test]
    fn test_reset_touches_only_that_frame() {
        let (driver, manager) = manager(2, 3);
        manager.reset_pools(1);
        let resets = driver.pool_resets();
        assert_eq!(resets.len(), 4);
        for thread in 0..2 {
            let pools = manager.pools(1, thread);
            assert!(resets.contains(&pools.graphics));
            assert!(resets.contains(&pools.compute));
        }
    }

    #[test]
    fn test_query_layout() {
        let (_driver, manager) = manager(1, 2);
        let per_frame = DeviceConfig::default().time_queries_per_frame;
        assert_eq!(manager.timestamp_range(0), 0..per_frame);
        assert_eq!(manager.timestamp_range(2), 2 * per_frame..3 * per_frame);
        assert_eq!(manager.statistics_query(3), 3);
    }

    #[test]
    fn test_drop_destroys_pools() {
        let (driver, manager) = manager(2, 2);
        drop(manager);
        assert_eq!(driver.destroy_count(DummyObjectKind::CommandPool), 8);
        assert_eq!(driver.destroy_count(DummyObjectKind::QueryPool), 8);
    }
}
