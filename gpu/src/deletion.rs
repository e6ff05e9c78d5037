//! Deferred destruction of native objects.
//!
//! GPU commands execute asynchronously: when the last [`Handle`](crate::Handle)
//! to a resource goes away, command buffers submitted in earlier frames may
//! still reference its native object. Instead of destroying it, the
//! resource's guard pushes a [`DeletionEntry`] stamped with the current
//! frame. The frame coordinator flushes entries once the timeline values
//! recorded for their frame have been reached.
//!
//! ```text
//! Drop(last handle)
//!   -> NativeResource::drop
//!   -> DeletionQueue::enqueue(kind, handle, allocation)   stamped frame N
//!
//! present(frame N)         records graphics/compute values of frame N
//! ...
//! GPU reaches both values  -> flush_retired(N) -> Driver::destroy_*
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::driver::{AllocationToken, Driver, NativeHandle};

/// Kind of native object held by a deletion entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Buffer and its memory.
    Buffer,
    /// Texture, its view and its memory.
    Texture,
    /// Sampler.
    Sampler,
    /// Pipeline and its layout.
    Pipeline,
    /// Descriptor set and its layout.
    DescriptorSet,
    /// Retired swapchain.
    Swapchain,
}

/// A native object waiting for the GPU to retire its last use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionEntry {
    /// What to destroy.
    pub kind: ResourceKind,
    /// Native object.
    pub handle: NativeHandle,
    /// Memory owned by the object.
    pub allocation: Option<AllocationToken>,
    /// Absolute frame index the object was released in.
    pub frame: u64,
}

impl DeletionEntry {
    fn destroy(self, driver: &dyn Driver) {
        log::trace!(
            "DeletionQueue: destroying {:?} {} (released in frame {})",
            self.kind,
            self.handle,
            self.frame
        );
        match self.kind {
            ResourceKind::Buffer => driver.destroy_buffer(self.handle, self.allocation),
            ResourceKind::Texture => driver.destroy_texture(self.handle, self.allocation),
            ResourceKind::Sampler => driver.destroy_sampler(self.handle),
            ResourceKind::Pipeline => driver.destroy_pipeline(self.handle),
            ResourceKind::DescriptorSet => driver.destroy_descriptor_set(self.handle),
            ResourceKind::Swapchain => driver.destroy_swapchain(self.handle),
        }
    }
}

#[derive(Debug)]
struct FrameBucket {
    frame: u64,
    entries: Vec<DeletionEntry>,
}

/// Queue of native objects pending destruction, grouped by release frame.
///
/// Enqueueing is O(1) and allowed from any thread. Flushing calls into the
/// driver and is done by the control thread.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    buckets: Mutex<VecDeque<FrameBucket>>,
    current_frame: AtomicU64,
}

impl DeletionQueue {
    /// Create an empty queue at frame zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a native object for destruction, stamped with the current frame.
    pub fn enqueue(
        &self,
        kind: ResourceKind,
        handle: NativeHandle,
        allocation: Option<AllocationToken>,
    ) {
        let mut buckets = self.buckets.lock();
        // Loaded under the lock so bucket frames stay sorted.
        let frame = self.current_frame.load(Ordering::Acquire);
        let entry = DeletionEntry {
            kind,
            handle,
            allocation,
            frame,
        };
        match buckets.back_mut() {
            Some(bucket) if bucket.frame == frame => bucket.entries.push(entry),
            _ => buckets.push_back(FrameBucket {
                frame,
                entries: vec![entry],
            }),
        }
    }

    /// Absolute frame new entries are stamped with.
    pub fn current_frame(&self) -> u64 {
        self.current_frame.load(Ordering::Acquire)
    }

    /// Move to a new frame. Frames never go backwards.
    pub fn set_current_frame(&self, frame: u64) {
        let _buckets = self.buckets.lock();
        self.current_frame.fetch_max(frame, Ordering::AcqRel);
    }

    /// Number of entries waiting.
    pub fn pending_count(&self) -> usize {
        self.buckets.lock().iter().map(|b| b.entries.len()).sum()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Release frame of the oldest waiting entry.
    pub fn oldest_pending_frame(&self) -> Option<u64> {
        self.buckets.lock().front().map(|b| b.frame)
    }

    /// Snapshot of the waiting entries, oldest first.
    pub fn pending_entries(&self) -> Vec<DeletionEntry> {
        self.buckets
            .lock()
            .iter()
            .flat_map(|b| b.entries.iter().copied())
            .collect()
    }

    /// Destroy every entry released in `retired_frame` or earlier.
    ///
    /// The caller guarantees the GPU finished all work of those frames.
    /// Returns the number of objects destroyed.
    pub fn flush_retired(&self, driver: &dyn Driver, retired_frame: u64) -> usize {
        let mut retired = Vec::new();
        {
            let mut buckets = self.buckets.lock();
            while buckets
                .front()
                .is_some_and(|bucket| bucket.frame <= retired_frame)
            {
                if let Some(bucket) = buckets.pop_front() {
                    retired.extend(bucket.entries);
                }
            }
        }
        // Destroy outside the lock so releases from other threads never wait
        // on driver calls.
        let count = retired.len();
        for entry in retired {
            entry.destroy(driver);
        }
        if count > 0 {
            log::debug!(
                "DeletionQueue: flushed {} objects up to frame {}",
                count,
                retired_frame
            );
        }
        count
    }

    /// Destroy every entry regardless of frame.
    ///
    /// Only valid once the GPU is idle. Returns the number of objects
    /// destroyed.
    pub fn flush(&self, driver: &dyn Driver) -> usize {
        let drained: Vec<_> = self.buckets.lock().drain(..).collect();
        let mut count = 0;
        for bucket in drained {
            for entry in bucket.entries {
                entry.destroy(driver);
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("DeletionQueue: flushed all {} pending objects", count);
        }
        count
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        let leaked: usize = self.buckets.get_mut().iter().map(|b| b.entries.len()).sum();
        if leaked > 0 {
            log::warn!(
                "DeletionQueue: dropped with {} native objects pending, they leak",
                leaked
            );
        }
    }
}

static_assertions::assert_impl_all!(DeletionQueue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::driver::dummy::DummyObjectKind;

    fn handle(raw: u64) -> NativeHandle {
        NativeHandle::from_raw(raw)
    }

    #[test]
    fn test_entries_are_stamped_with_current_frame() {
        let queue = DeletionQueue::new();
        queue.enqueue(ResourceKind::Buffer, handle(1), None);
        queue.set_current_frame(3);
        queue.enqueue(ResourceKind::Sampler, handle(2), None);

        let frames: Vec<_> = queue.pending_entries().iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![0, 3]);
        assert_eq!(queue.oldest_pending_frame(), Some(0));
    }

    #[test]
    fn test_frames_never_go_backwards() {
        let queue = DeletionQueue::new();
        queue.set_current_frame(5);
        queue.set_current_frame(2);
        assert_eq!(queue.current_frame(), 5);
    }

    #[test]
    fn test_flush_retired_keeps_younger_frames() {
        let driver = DummyDriver::new();
        let queue = DeletionQueue::new();
        queue.enqueue(ResourceKind::Buffer, handle(1), None);
        queue.set_current_frame(1);
        queue.enqueue(ResourceKind::Texture, handle(2), None);
        queue.set_current_frame(2);
        queue.enqueue(ResourceKind::Pipeline, handle(3), None);

        assert_eq!(queue.flush_retired(&driver, 1), 2);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(driver.destroy_count_of(handle(1)), 1);
        assert_eq!(driver.destroy_count_of(handle(2)), 1);
        assert_eq!(driver.destroy_count_of(handle(3)), 0);
    }

    #[test]
    fn test_flush_dispatches_on_kind() {
        let driver = DummyDriver::new();
        let queue = DeletionQueue::new();
        queue.enqueue(ResourceKind::Buffer, handle(1), None);
        queue.enqueue(ResourceKind::Texture, handle(2), None);
        queue.enqueue(ResourceKind::Sampler, handle(3), None);
        queue.enqueue(ResourceKind::Pipeline, handle(4), None);
        queue.enqueue(ResourceKind::DescriptorSet, handle(5), None);
        queue.enqueue(ResourceKind::Swapchain, handle(6), None);

        assert_eq!(queue.flush(&driver), 6);
        assert!(queue.is_empty());
        assert_eq!(
            driver.destroyed_objects(),
            vec![
                (DummyObjectKind::Buffer, handle(1)),
                (DummyObjectKind::Texture, handle(2)),
                (DummyObjectKind::Sampler, handle(3)),
                (DummyObjectKind::Pipeline, handle(4)),
                (DummyObjectKind::DescriptorSet, handle(5)),
                (DummyObjectKind::Swapchain, handle(6)),
            ]
        );
    }

    #[test]
    fn test_flush_of_empty_queue() {
        let driver = DummyDriver::new();
        let queue = DeletionQueue::new();
        assert_eq!(queue.flush(&driver), 0);
        assert_eq!(queue.flush_retired(&driver, 100), 0);
    }
}
