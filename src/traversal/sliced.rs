//! The sliced schedule family.
//!
//! The base-step space is cut along its longest dimension into one slice
//! per thread. Slices run concurrently; writes across a slice boundary are
//! serialised either by a lock on the boundary layer (lock-based and
//! balanced variants) or by two-colouring the slices (c02 variant).

use crate::util::parallel;
use std::sync::Mutex;

/// How slice boundaries are protected.
#[derive(Debug, Clone)]
pub(crate) enum SliceSchedule {
    /// One lock per boundary, released as soon as the boundary layer is done.
    Lock,
    /// Even slices first, then odd slices; no locks.
    C02,
    /// Lock-based with slice widths chosen from per-layer load estimates.
    Balanced(Vec<u64>),
}

/// A planned slicing: the dimension that was cut and the first layer of
/// each slice (plus the end sentinel).
#[derive(Debug, Clone)]
pub(crate) struct SliceSpec {
    pub dim: usize,
    pub starts: Vec<usize>,
}

impl SliceSpec {
    pub fn num_slices(&self) -> usize {
        self.starts.len() - 1
    }
}

/// Cut `base_dims` along its longest dimension into at most `threads`
/// slices of at least `min_thickness` layers. Returns `None` when not even
/// two slices fit; callers then fall back to a sequential sweep.
pub(crate) fn plan_slices(
    base_dims: [usize; 3],
    threads: usize,
    min_thickness: usize,
    loads: Option<&[u64]>,
) -> Option<SliceSpec> {
    let dim = (0..3).max_by_key(|&d| base_dims[d]).unwrap_or(0);
    let layers = base_dims[dim];
    let num_slices = (layers / min_thickness).min(threads.max(1));
    if num_slices < 2 {
        return None;
    }

    let starts = match loads {
        Some(loads) if loads.len() == layers => {
            balanced_starts(loads, num_slices, min_thickness)
        }
        _ => {
            // equal thickness, remainder spread over the first slices
            let base = layers / num_slices;
            let remainder = layers % num_slices;
            let mut starts = Vec::with_capacity(num_slices + 1);
            let mut at = 0;
            for s in 0..num_slices {
                starts.push(at);
                at += base + usize::from(s < remainder);
            }
            starts.push(layers);
            starts
        }
    };
    Some(SliceSpec { dim, starts })
}

/// Cut positions that even out the aggregated load per slice. Every slice
/// keeps the minimum thickness; the last slice takes the rest.
fn balanced_starts(loads: &[u64], num_slices: usize, min_thickness: usize) -> Vec<usize> {
    let layers = loads.len();
    let total: u64 = loads.iter().sum();
    let target = total / num_slices as u64;

    let mut starts = Vec::with_capacity(num_slices + 1);
    starts.push(0);
    let mut accumulated = 0u64;
    for s in 1..num_slices {
        // leave room for the slices still to come
        let latest_start = layers - (num_slices - s) * min_thickness;
        let earliest_start = starts[s - 1] + min_thickness;
        let mut cut = earliest_start;
        while cut < latest_start
            && accumulated + slice_load(loads, starts[s - 1], cut) < target * s as u64
        {
            cut += 1;
        }
        let cut = cut.clamp(earliest_start, latest_start);
        accumulated += slice_load(loads, starts[s - 1], cut);
        starts.push(cut);
    }
    starts.push(layers);
    starts
}

fn slice_load(loads: &[u64], from: usize, to: usize) -> u64 {
    loads[from..to].iter().sum()
}

/// Run the schedule. `step` is invoked once per base index `[x, y, z]` of
/// `base_dims`, grouped layer-by-layer along the slice dimension.
///
/// `forward_reach`/`backward_reach` bound how many layers beyond its own a
/// step may touch in the slice dimension; the schedule guarantees that no
/// two concurrently running steps have overlapping footprints. Steps of
/// two adjacent slices can conflict while both are within
/// `forward_reach + backward_reach` layers of their shared boundary, so
/// that is how long the boundary lock is held on either side.
pub(crate) fn run<S>(
    base_dims: [usize; 3],
    spec: &SliceSpec,
    schedule: &SliceSchedule,
    backward_reach: usize,
    step: S,
) where
    S: Fn([usize; 3]) + Send + Sync,
{
    match schedule {
        SliceSchedule::Lock | SliceSchedule::Balanced(_) => {
            // forward reach is always one layer here (the c08 block and the
            // forward-ordered lists); backward reach depends on the caller
            run_locked(base_dims, spec, 1 + backward_reach, &step)
        }
        SliceSchedule::C02 => run_two_colored(base_dims, spec, &step),
    }
}

fn run_locked<S>(base_dims: [usize; 3], spec: &SliceSpec, boundary_width: usize, step: &S)
where
    S: Fn([usize; 3]) + Send + Sync,
{
    let num_slices = spec.num_slices();
    let locks: Vec<Mutex<()>> = (0..=num_slices).map(|_| Mutex::new(())).collect();

    parallel::for_each_index(num_slices, |s| {
        let begin = spec.starts[s];
        let end = spec.starts[s + 1];
        // own start boundary, contended with the previous slice's tail
        let mut start_guard = Some(lock_of(&locks, s));
        let mut end_guard = None;
        for layer in begin..end {
            if end_guard.is_none() && layer + boundary_width >= end && s + 1 < num_slices {
                // the tail of this slice reaches into the next one
                end_guard = Some(lock_of(&locks, s + 1));
            }
            walk_layer(base_dims, spec.dim, layer, step);
            if layer + 1 >= begin + boundary_width {
                start_guard.take();
            }
        }
        drop(end_guard);
        drop(start_guard);
    });
}

fn run_two_colored<S>(base_dims: [usize; 3], spec: &SliceSpec, step: &S)
where
    S: Fn([usize; 3]) + Send + Sync,
{
    for parity in 0..2usize {
        let slices: Vec<usize> = (parity..spec.num_slices()).step_by(2).collect();
        parallel::for_each(&slices, |&s| {
            for layer in spec.starts[s]..spec.starts[s + 1] {
                walk_layer(base_dims, spec.dim, layer, step);
            }
        });
    }
}

fn lock_of(locks: &[Mutex<()>], index: usize) -> std::sync::MutexGuard<'_, ()> {
    locks[index]
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn walk_layer<S>(base_dims: [usize; 3], slice_dim: usize, layer: usize, step: &S)
where
    S: Fn([usize; 3]),
{
    let others: Vec<usize> = (0..3).filter(|&d| d != slice_dim).collect();
    for a in 0..base_dims[others[0]] {
        for b in 0..base_dims[others[1]] {
            let mut idx = [0usize; 3];
            idx[slice_dim] = layer;
            idx[others[0]] = a;
            idx[others[1]] = b;
            step(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_plan_equal_slices() {
        let spec = plan_slices([16, 4, 4], 4, 2, None).unwrap();
        assert_eq!(spec.dim, 0);
        assert_eq!(spec.starts, vec![0, 4, 8, 12, 16]);
    }

    #[test]
    fn test_plan_limits_slices_to_thickness() {
        let spec = plan_slices([7, 4, 4], 8, 2, None).unwrap();
        assert_eq!(spec.num_slices(), 3);
        assert_eq!(*spec.starts.last().unwrap(), 7);
        for w in spec.starts.windows(2) {
            assert!(w[1] - w[0] >= 2);
        }
    }

    #[test]
    fn test_plan_rejects_tiny_domains() {
        assert!(plan_slices([3, 3, 3], 8, 2, None).is_none());
    }

    #[test]
    fn test_balanced_starts_follow_load() {
        // all load in the first four layers
        let loads = vec![100, 100, 100, 100, 1, 1, 1, 1, 1, 1, 1, 1];
        let spec = plan_slices([12, 2, 2], 2, 2, Some(&loads)).unwrap();
        assert_eq!(spec.num_slices(), 2);
        // the first slice should stay thin
        assert!(spec.starts[1] <= 4, "starts: {:?}", spec.starts);
        for w in spec.starts.windows(2) {
            assert!(w[1] - w[0] >= 2);
        }
    }

    #[test]
    fn test_run_visits_every_base_once() {
        for schedule in [SliceSchedule::Lock, SliceSchedule::C02] {
            for backward_reach in [0, 1] {
                let dims = [9, 3, 2];
                let spec = plan_slices(dims, 3, 2, None).unwrap();
                let visits = AtomicUsize::new(0);
                run(dims, &spec, &schedule, backward_reach, |_| {
                    visits.fetch_add(1, Ordering::Relaxed);
                });
                assert_eq!(visits.load(Ordering::Relaxed), 9 * 3 * 2);
            }
        }
    }
}
