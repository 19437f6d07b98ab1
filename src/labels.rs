//! # Alignment parameter labels
//!
//! Millepede identifies every global parameter by a strictly positive integer label.
//! [`AlignmentLabels`] assigns them once per run, **dof-major**: all X shifts first (one per
//! sensor, in z order), then all Y shifts, Z shifts, α, β and γ rotations.
//!
//! ```text
//! sensors (z order) : s0  s1  s2
//! ShiftX            :  1   2   3
//! ShiftY            :  4   5   6
//! ShiftZ            :  7   8   9
//! RotX (α)          : 10  11  12
//! RotY (β)          : 13  14  15
//! RotZ (γ)          : 16  17  18
//! ```
//!
//! Labels are allocated for every dof of every sensor, independently of the alignment mode, so
//! that the numbering of a sensor's shifts does not change between modes.
use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    alignment_mode::{AlignmentMode, DofKind},
    constants::{Label, SensorId},
};

/// Labels of one plane, in the slot order of an alignment mode.
pub type PlaneLabels = SmallVec<[Label; 6]>;

#[derive(Debug, Clone, Default)]
pub struct AlignmentLabels {
    by_key: AHashMap<(SensorId, DofKind), Label>,
    /// `by_label[label - 1]`
    by_label: Vec<(SensorId, DofKind)>,
}

impl AlignmentLabels {
    /// Allocate labels for `sensor_ids`, given in z order.
    pub fn allocate(sensor_ids: &[SensorId]) -> Self {
        let mut by_key = AHashMap::with_capacity(sensor_ids.len() * DofKind::ALL.len());
        let mut by_label = Vec::with_capacity(sensor_ids.len() * DofKind::ALL.len());

        for dof in DofKind::ALL {
            for &sensor_id in sensor_ids {
                by_label.push((sensor_id, dof));
                by_key.insert((sensor_id, dof), by_label.len() as Label);
            }
        }

        AlignmentLabels { by_key, by_label }
    }

    pub fn label(&self, sensor_id: SensorId, dof: DofKind) -> Option<Label> {
        self.by_key.get(&(sensor_id, dof)).copied()
    }

    /// Labels of the active dofs of `mode` for one sensor, in the mode's slot order.
    ///
    /// Returns `None` for a sensor that was not part of the allocation.
    pub fn labels_for(&self, sensor_id: SensorId, mode: AlignmentMode) -> Option<PlaneLabels> {
        mode.active_dofs()
            .iter()
            .map(|&dof| self.label(sensor_id, dof))
            .collect()
    }

    /// Reverse lookup: the sensor and dof a label stands for.
    pub fn lookup(&self, label: Label) -> Option<(SensorId, DofKind)> {
        let index = (label as usize).checked_sub(1)?;
        self.by_label.get(index).copied()
    }

    /// Number of allocated labels.
    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}
