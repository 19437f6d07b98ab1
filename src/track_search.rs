//! # Track-candidate search
//!
//! Depth-first enumeration of hit combinations, one slot per plane, tolerating a bounded number
//! of absent planes.
//!
//! ## Algorithm
//!
//! Planes are visited in z order. On a plane with hits the search branches once per hit; on an
//! empty plane it records a single absent slot. Before a hit of plane `k > 0` is assigned it is
//! compared with the hit held by slot `k − 1` only:
//!
//! ```text
//! |x_k − x_{k−1}| ∈ [x_min, x_max]   and   |y_k − y_{k−1}| ∈ [y_min, y_max]
//! ```
//!
//! with the window configured for z-order index `k − 1`. An absent slot `k − 1` fails the check.
//! A failing hit does **not** kill the branch: the slot is forced absent and the branch carries
//! on with one more missing plane. Plane 0 is never checked.
//!
//! A branch is dropped as soon as its missing count exceeds the budget; a branch that went past
//! the last plane becomes a candidate. The output stops growing at the per-event cap and the
//! recursion unwinds without error.
//!
//! Order of the output is deterministic: plane order first, then hit order within the store.
//!
//! ## Complexity
//!
//! Worst case is the product of the per-plane hit multiplicities. The residual windows keep the
//! fan-out small in practice; the per-event cap bounds the rest.
use crate::{
    constants::{PlaneSlots, ZOrder},
    geometry::PlaneCatalog,
    hits::{Hit, HitStore},
};

/// One hit index (into [`HitStore::hits_on`]) or `None` per plane, in z order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCandidate {
    slots: PlaneSlots,
}

impl TrackCandidate {
    pub fn new(slots: PlaneSlots) -> Self {
        TrackCandidate { slots }
    }

    pub fn slots(&self) -> &[Option<usize>] {
        &self.slots
    }

    pub fn slot(&self, z_order: ZOrder) -> Option<usize> {
        self.slots.get(z_order).copied().flatten()
    }

    /// Number of absent planes.
    pub fn missing(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Resolve the slots against the store: `None` for an absent plane.
    pub fn hits<'s>(&self, store: &'s HitStore) -> Vec<Option<&'s Hit>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(z, slot)| slot.and_then(|i| store.hit(z, i)))
            .collect()
    }
}

/// Configured candidate search.
#[derive(Debug, Clone, Copy)]
pub struct TrackCandidateSearch {
    max_missing: usize,
    max_candidates: usize,
}

impl TrackCandidateSearch {
    pub fn new(max_missing: usize, max_candidates: usize) -> Self {
        TrackCandidateSearch {
            max_missing,
            max_candidates,
        }
    }

    /// Enumerate the candidates of one event.
    ///
    /// Arguments
    /// -----------------
    /// * `catalog`: plane catalog providing the residual windows.
    /// * `store`: hits of the event, bucketed by z order.
    ///
    /// Return
    /// ----------
    /// * At most `max_candidates` candidates, each with at most `max_missing` absent slots.
    ///   An event without any viable combination gives an empty list.
    pub fn search(&self, catalog: &PlaneCatalog, store: &HitStore) -> Vec<TrackCandidate> {
        let mut out = Vec::new();
        if self.max_candidates == 0 || store.n_planes() == 0 {
            return out;
        }
        let mut slots = PlaneSlots::new();
        self.descend(catalog, store, 0, 0, &mut slots, &mut out);
        out
    }

    fn descend(
        &self,
        catalog: &PlaneCatalog,
        store: &HitStore,
        plane: ZOrder,
        missing: usize,
        slots: &mut PlaneSlots,
        out: &mut Vec<TrackCandidate>,
    ) {
        if missing > self.max_missing || out.len() >= self.max_candidates {
            return;
        }
        if plane == store.n_planes() {
            out.push(TrackCandidate::new(slots.clone()));
            return;
        }

        let hits = store.hits_on(plane);
        if hits.is_empty() {
            slots.push(None);
            self.descend(catalog, store, plane + 1, missing + 1, slots, out);
            slots.pop();
            return;
        }

        for (index, hit) in hits.iter().enumerate() {
            if out.len() >= self.max_candidates {
                break;
            }
            let (slot, next_missing) = if self.accepts(catalog, store, plane, slots, hit) {
                (Some(index), missing)
            } else {
                (None, missing + 1)
            };
            slots.push(slot);
            self.descend(catalog, store, plane + 1, next_missing, slots, out);
            slots.pop();
        }
    }

    /// Single-slot look-back against plane `plane − 1`.
    fn accepts(
        &self,
        catalog: &PlaneCatalog,
        store: &HitStore,
        plane: ZOrder,
        slots: &PlaneSlots,
        hit: &Hit,
    ) -> bool {
        if plane == 0 {
            return true;
        }
        let previous = slots[plane - 1].and_then(|i| store.hit(plane - 1, i));
        let (Some(previous), Some(window)) = (
            previous,
            catalog.plane(plane - 1).map(|p| p.residual_window),
        ) else {
            return false;
        };
        window.contains((hit.x - previous.x).abs(), (hit.y - previous.y).abs())
    }
}
