//! Thin dispatch layer between sequential loops and the rayon thread pool.
//!
//! All traversal schedules funnel through these helpers so that the pair
//! visit semantics are byte-for-byte identical with and without the `rayon`
//! feature; the feature only changes who executes which loop iteration.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Number of worker threads the traversal schedules may assume.
pub(crate) fn max_threads() -> usize {
    #[cfg(feature = "rayon")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "rayon"))]
    {
        1
    }
}

/// Apply `f` to every item, in parallel when the pool is available.
#[cfg(feature = "rayon")]
pub(crate) fn for_each<T, F>(items: &[T], f: F)
where
    T: Sync,
    F: Fn(&T) + Send + Sync,
{
    items.par_iter().for_each(f);
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn for_each<T, F>(items: &[T], f: F)
where
    F: Fn(&T),
{
    items.iter().for_each(f);
}

/// Apply `f` to every item through an exclusive borrow, in parallel when
/// possible.
#[cfg(feature = "rayon")]
pub(crate) fn for_each_mut<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(&mut T) + Send + Sync,
{
    items.par_iter_mut().for_each(f);
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn for_each_mut<T, F>(items: &mut [T], f: F)
where
    F: Fn(&mut T),
{
    items.iter_mut().for_each(f);
}

/// Apply `f` to every index of `0..len`, in parallel when possible.
#[cfg(feature = "rayon")]
pub(crate) fn for_each_index<F>(len: usize, f: F)
where
    F: Fn(usize) + Send + Sync,
{
    (0..len).into_par_iter().for_each(f);
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn for_each_index<F>(len: usize, f: F)
where
    F: Fn(usize),
{
    (0..len).for_each(f);
}

/// Map every index of `0..len` and collect, in parallel when possible.
#[cfg(feature = "rayon")]
pub(crate) fn map_indices<R, F>(len: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Send + Sync,
{
    (0..len).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn map_indices<R, F>(len: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R,
{
    (0..len).map(f).collect()
}

/// Raw pointer wrapper that promises cross-thread usability.
///
/// The colourings and slicings guarantee that concurrently processed base
/// steps touch disjoint cells; that argument lives at the call sites. This
/// wrapper only carries the pointer across the thread boundary.
pub(crate) struct SendSyncPtr<T>(*mut T);

unsafe impl<T> Send for SendSyncPtr<T> {}
unsafe impl<T> Sync for SendSyncPtr<T> {}

impl<T> SendSyncPtr<T> {
    /// Caller vouches that every concurrent `get_mut`/`get` access pattern
    /// on the wrapped allocation is free of aliasing exclusive references.
    pub unsafe fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    /// Exclusive reference to element `index`.
    ///
    /// # Safety
    /// No other live reference to element `index` may exist for the
    /// lifetime of the returned borrow.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: usize) -> &mut T {
        &mut *self.0.add(index)
    }

    /// Shared reference to element `index`.
    ///
    /// # Safety
    /// No live exclusive reference to element `index` may exist for the
    /// lifetime of the returned borrow.
    #[inline]
    pub unsafe fn get(&self, index: usize) -> &T {
        &*self.0.add(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_for_each_index_visits_all() {
        let hits = AtomicUsize::new(0);
        for_each_index(1000, |_| {
            hits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn test_map_indices_order() {
        let doubled = map_indices(10, |i| i * 2);
        assert_eq!(doubled, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[test]
    fn test_send_sync_ptr_disjoint_writes() {
        let mut values = vec![0usize; 64];
        let ptr = unsafe { SendSyncPtr::new(values.as_mut_ptr()) };
        for_each_index(64, |i| {
            // each index is visited exactly once, so the borrows are disjoint
            let slot = unsafe { ptr.get_mut(i) };
            *slot = i;
        });
        assert!(values.iter().enumerate().all(|(i, &v)| i == v));
    }
}
