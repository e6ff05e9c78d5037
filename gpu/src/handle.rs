//! Shared ownership handles for GPU resources.
//!
//! A [`Handle<T>`] is a nullable, atomically reference-counted pointer to a
//! resource. Cloning increments the count, dropping or [`Handle::reset`]
//! decrements it. When the last handle goes away the resource is dropped,
//! and its native guard puts the native object into the
//! [`DeletionQueue`](crate::DeletionQueue) instead of destroying it, so
//! work already submitted to the GPU can keep using it.
//!
//! # Example
//!
//! ```
//! use redlilium_gpu::Handle;
//!
//! let a = Handle::new(42u32);
//! let b = a.clone();
//! assert_eq!(a.ref_count(), 2);
//! drop(b);
//! assert_eq!(a.ref_count(), 1);
//! assert_eq!(*a, 42);
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Reference-counted handle to a resource, possibly invalid.
pub struct Handle<T> {
    inner: Option<Arc<T>>,
}

impl<T> Handle<T> {
    /// Adopt a freshly created resource. The count starts at one.
    pub fn new(resource: T) -> Self {
        Self {
            inner: Some(Arc::new(resource)),
        }
    }

    /// Wrap an existing shared resource, taking over one reference.
    pub fn from_arc(resource: Arc<T>) -> Self {
        Self {
            inner: Some(resource),
        }
    }

    /// An invalid handle.
    pub const fn invalid() -> Self {
        Self { inner: None }
    }

    /// Re-adopt a reference released by [`Handle::detach`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Handle::detach`] of a handle to the same `T`,
    /// and each detached pointer may be adopted only once.
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        if ptr.is_null() {
            return Self::invalid();
        }
        // SAFETY: the caller guarantees `ptr` came from `Arc::into_raw` via
        // `detach` and is adopted once, so the strong count it carries is
        // handed back exactly once.
        Self {
            inner: Some(unsafe { Arc::from_raw(ptr) }),
        }
    }

    /// Whether the handle refers to a resource.
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Borrow the resource, if any.
    pub fn get(&self) -> Option<&T> {
        self.inner.as_deref()
    }

    /// The shared resource, if any.
    pub fn as_arc(&self) -> Option<&Arc<T>> {
        self.inner.as_ref()
    }

    /// Number of live handles to the resource, zero for an invalid handle.
    pub fn ref_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    /// Release this handle's reference. Releasing the last reference queues
    /// the resource for destruction.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Move the reference out, leaving an invalid handle behind. The count is
    /// unchanged.
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Give up the reference without decrementing the count.
    ///
    /// The pointer must eventually be passed to [`Handle::from_raw`] or the
    /// resource leaks.
    pub fn detach(mut self) -> Option<*const T> {
        self.inner.take().map(Arc::into_raw)
    }

    /// Whether both handles refer to the same resource. Two invalid handles
    /// compare equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match &self.inner {
            Some(resource) => resource,
            None => {
                log::error!(
                    "Dereferenced an invalid Handle<{}>",
                    std::any::type_name::<T>()
                );
                panic!("dereferenced an invalid handle");
            }
        }
    }
}

impl<T> From<Arc<T>> for Handle<T> {
    fn from(resource: Arc<T>) -> Self {
        Self::from_arc(resource)
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(resource) => f
                .debug_struct("Handle")
                .field("ref_count", &Arc::strong_count(resource))
                .field("resource", resource)
                .finish(),
            None => write!(f, "Handle(invalid)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_clone_and_reset_adjust_count() {
        let mut a = Handle::new(1u8);
        let mut b = a.clone();
        assert_eq!(a.ref_count(), 2);
        b.reset();
        assert!(!b.is_valid());
        assert_eq!(a.ref_count(), 1);
        a.reset();
        assert_eq!(a.ref_count(), 0);
    }

    #[test]
    fn test_take_leaves_invalid_handle() {
        let mut a = Handle::new(5u32);
        let b = a.take();
        assert!(!a.is_valid());
        assert_eq!(b.ref_count(), 1);
        assert_eq!(*b, 5);
    }

    #[test]
    fn test_last_release_drops_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let a = Handle::new(DropCounter(drops.clone()));
        let b = a.clone();
        let c = b.clone();
        drop(a);
        drop(c);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detach_and_readopt() {
        let drops = Arc::new(AtomicUsize::new(0));
        let a = Handle::new(DropCounter(drops.clone()));
        let keep = a.clone();
        let raw = a.detach().unwrap();
        assert_eq!(keep.ref_count(), 2);

        let back = unsafe { Handle::from_raw(raw) };
        assert!(back.ptr_eq(&keep));
        drop(back);
        drop(keep);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_handles() {
        let a: Handle<u32> = Handle::default();
        assert!(!a.is_valid());
        assert!(a.get().is_none());
        assert!(a.ptr_eq(&Handle::invalid()));
        assert!(a.clone().detach().is_none());
    }

    #[test]
    #[should_panic(expected = "dereferenced an invalid handle")]
    fn test_deref_invalid_panics() {
        let a: Handle<u32> = Handle::invalid();
        let _ = *a;
    }
}
