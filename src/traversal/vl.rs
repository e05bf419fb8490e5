//! Verlet-list traversal: every particle against its pre-built list.
//!
//! Runs without Newton-3 only; the lists are symmetric, so each pair is
//! visited once from either side and a base step never writes anybody
//! else's particle. That makes the parallel AoS sweep a plain gather.

use crate::functor::Functor;
use crate::options::DataLayout;
use crate::particle::Particle;
use crate::soa::Soa;
use crate::util::parallel;

pub(crate) fn list_iteration<F: Functor>(
    arena: &mut [Particle],
    lists: &[Vec<u32>],
    layout: DataLayout,
    functor: &F,
) {
    debug_assert_eq!(arena.len(), lists.len());
    match layout {
        DataLayout::Aos => {
            let snapshot: &[Particle] = arena;
            let updated = parallel::map_indices(snapshot.len(), |i| {
                let p = snapshot[i];
                if p.is_dummy() || lists[i].is_empty() {
                    return None;
                }
                let mut own = p;
                for &j in &lists[i] {
                    let partner = snapshot[j as usize];
                    if partner.is_dummy() {
                        continue;
                    }
                    let mut scratch = partner;
                    functor.aos(&mut own, &mut scratch, false);
                }
                Some(own)
            });
            for (i, p) in updated.into_iter().enumerate() {
                if let Some(p) = p {
                    arena[i] = p;
                }
            }
        }
        DataLayout::Soa => {
            let mut soa = Soa::default();
            functor.soa_load(arena, &mut soa);
            for (i, list) in lists.iter().enumerate() {
                if !list.is_empty() {
                    functor.soa_verlet(&mut soa, i, list, false);
                }
            }
            functor.soa_extract(arena, &soa);
        }
    }
}
