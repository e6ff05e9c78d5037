//! GPU resource types.
//!
//! Every resource owns a [`NativeResource`] guard. Dropping the resource
//! (when its last [`Handle`](crate::Handle) goes away) hands the native
//! object to the [`DeletionQueue`] instead of destroying it.
//!
//! Live resources are tracked per kind in a [`ResourceArray`]: a slot table
//! of weak references with free-list reuse, so ids stay small and the
//! device can report live counts.

mod buffer;
mod descriptor_set;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use descriptor_set::{DescriptorResource, DescriptorSet, DescriptorWrite};
pub use pipeline::Pipeline;
pub use sampler::Sampler;
pub use texture::Texture;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::deletion::{DeletionQueue, ResourceKind};
use crate::driver::{AllocationToken, NativeHandle};
use crate::types::ResourceState;

/// Slot index of a resource inside its [`ResourceArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native object owned by a resource.
///
/// Dropping the guard queues the object for deferred destruction.
pub struct NativeResource {
    kind: ResourceKind,
    handle: NativeHandle,
    allocation: Option<AllocationToken>,
    deletion: Arc<DeletionQueue>,
}

impl NativeResource {
    pub(crate) fn new(
        kind: ResourceKind,
        handle: NativeHandle,
        allocation: Option<AllocationToken>,
        deletion: Arc<DeletionQueue>,
    ) -> Self {
        Self {
            kind,
            handle,
            allocation,
            deletion,
        }
    }

    /// Kind of the native object.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The native object.
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Memory allocation owned by the object.
    pub fn allocation(&self) -> Option<AllocationToken> {
        self.allocation
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        self.deletion
            .enqueue(self.kind, self.handle, self.allocation);
    }
}

impl fmt::Debug for NativeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeResource")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Usage state of a resource as last recorded by a transition.
///
/// Only the thread recording the transition touches it, so relaxed ordering
/// is enough.
#[derive(Debug, Default)]
pub struct ResourceStateCell(AtomicU8);

impl ResourceStateCell {
    /// Create a cell in `state`.
    pub fn new(state: ResourceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    pub fn get(&self) -> ResourceState {
        ResourceState::from_raw(self.0.load(Ordering::Relaxed))
    }

    /// Overwrite the state, returning the previous one.
    pub fn replace(&self, state: ResourceState) -> ResourceState {
        ResourceState::from_raw(self.0.swap(state as u8, Ordering::Relaxed))
    }
}

/// Common interface of device-created resources.
pub trait GpuResource: Send + Sync + 'static {
    /// Kind used for deferred destruction.
    const KIND: ResourceKind;

    /// Slot of the resource in its array.
    fn id(&self) -> ResourceId;

    /// The native object.
    fn native(&self) -> NativeHandle;

    /// Debug label, if set.
    fn label(&self) -> Option<&str>;
}

#[derive(Debug)]
struct ArraySlots<T> {
    entries: Vec<Option<Weak<T>>>,
    free: Vec<u32>,
}

/// Slot table of live resources of one kind.
///
/// Holds weak references only: the array never keeps a resource alive.
/// Slots of released resources are recycled after [`ResourceArray::cleanup`].
#[derive(Debug)]
pub struct ResourceArray<T> {
    slots: RwLock<ArraySlots<T>>,
}

impl<T> Default for ResourceArray<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(ArraySlots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
        }
    }
}

impl<T> ResourceArray<T> {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot and store the resource built for it.
    pub fn insert_with(&self, make: impl FnOnce(ResourceId) -> T) -> Arc<T> {
        let mut slots = self.slots.write();
        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                slots.entries.push(None);
                (slots.entries.len() - 1) as u32
            }
        };
        let resource = Arc::new(make(ResourceId(index)));
        slots.entries[index as usize] = Some(Arc::downgrade(&resource));
        resource
    }

    /// Look up a live resource by id.
    pub fn get(&self, id: ResourceId) -> Option<Arc<T>> {
        self.slots
            .read()
            .entries
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade)
    }

    /// Number of resources still alive.
    pub fn live_count(&self) -> usize {
        self.slots
            .read()
            .entries
            .iter()
            .flatten()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Number of slots, live or not.
    pub fn capacity(&self) -> usize {
        self.slots.read().entries.len()
    }

    /// Return the slots of released resources to the free list.
    ///
    /// Returns the number of slots recycled.
    pub fn cleanup(&self) -> usize {
        let mut slots = self.slots.write();
        let slots = &mut *slots;
        let mut recycled = 0;
        for (index, slot) in slots.entries.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|w| w.strong_count() == 0) {
                *slot = None;
                slots.free.push(index as u32);
                recycled += 1;
            }
        }
        recycled
    }
}

static_assertions::assert_impl_all!(NativeResource: Send, Sync);
static_assertions::assert_impl_all!(ResourceArray<Buffer>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_drop_enqueues() {
        let deletion = Arc::new(DeletionQueue::new());
        let guard = NativeResource::new(
            ResourceKind::Sampler,
            NativeHandle::from_raw(9),
            None,
            deletion.clone(),
        );
        assert_eq!(deletion.pending_count(), 0);
        drop(guard);
        let pending = deletion.pending_entries();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ResourceKind::Sampler);
        assert_eq!(pending[0].handle, NativeHandle::from_raw(9));
    }

    #[test]
    fn test_state_cell() {
        let cell = ResourceStateCell::new(ResourceState::Undefined);
        assert_eq!(cell.replace(ResourceState::CopyDst), ResourceState::Undefined);
        assert_eq!(cell.get(), ResourceState::CopyDst);
    }

    #[test]
    fn test_array_slot_reuse() {
        let array = ResourceArray::<u32>::new();
        let a = array.insert_with(|id| id.index() as u32);
        let b = array.insert_with(|id| id.index() as u32);
        assert_eq!((*a, *b), (0, 1));
        assert_eq!(array.live_count(), 2);

        drop(a);
        assert_eq!(array.live_count(), 1);
        // Dead slots are not reused before cleanup.
        let c = array.insert_with(|id| id.index() as u32);
        assert_eq!(*c, 2);

        assert_eq!(array.cleanup(), 1);
        let d = array.insert_with(|id| id.index() as u32);
        assert_eq!(*d, 0);
        assert_eq!(array.capacity(), 3);
        assert_eq!(array.live_count(), 3);
        drop(b);
    }

    #[test]
    fn test_array_get() {
        let array = ResourceArray::<&'static str>::new();
        let a = array.insert_with(|_| "a");
        let id = ResourceId(0);
        assert_eq!(array.get(id).as_deref(), Some(&"a"));
        drop(a);
        assert!(array.get(id).is_none());
        assert!(array.get(ResourceId(7)).is_none());
    }
}
