//! # Alignment modes and degrees of freedom
//!
//! An [`AlignmentMode`] selects which of the six rigid-body degrees of freedom ([`DofKind`]) are
//! solved for. The selection is a plain table: every consumer (the derivative builder, the label
//! allocator and the steering writer) walks [`AlignmentMode::active_dofs`] instead of branching
//! on the mode.
//!
//! | code | mode                        | active dofs (slot order)                      |
//! |------|-----------------------------|-----------------------------------------------|
//! | 1    | `XYShift`                   | ShiftX, ShiftY                                |
//! | 2    | `XYShiftXYRot`              | ShiftX, ShiftY, RotZ                          |
//! | 3    | `XYZShiftXYRot`             | ShiftX, ShiftY, RotZ, ShiftZ                  |
//! | 4    | `XYShiftYZRotXYRot`         | ShiftX, ShiftY, RotZ, RotX                    |
//! | 5    | `XYShiftXZRotXYRot`         | ShiftX, ShiftY, RotZ, RotY                    |
//! | 6    | `XYShiftXZRotYZRotXYRot`    | ShiftX, ShiftY, RotZ, RotY, RotX              |
//! | 7    | `XYZShiftXZRotYZRotXYRot`   | ShiftX, ShiftY, RotZ, ShiftZ, RotY, RotX      |
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::telmille_errors::TelMilleError;

use DofKind::*;

/// One rigid-body alignment degree of freedom of a plane.
///
/// The discriminant is the bit position used by per-plane fix masks
/// (bit 0 = X shift … bit 5 = rotation about Z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DofKind {
    ShiftX = 0,
    ShiftY = 1,
    ShiftZ = 2,
    /// α, rotation about the X axis (YZ plane)
    RotX = 3,
    /// β, rotation about the Y axis (XZ plane)
    RotY = 4,
    /// γ, rotation about the Z axis (XY plane)
    RotZ = 5,
}

impl DofKind {
    /// Allocation order of the label allocator.
    pub const ALL: [DofKind; 6] = [
        DofKind::ShiftX,
        DofKind::ShiftY,
        DofKind::ShiftZ,
        DofKind::RotX,
        DofKind::RotY,
        DofKind::RotZ,
    ];

    /// Index into a full 6-component derivative row.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this dof in a per-plane fix mask.
    #[inline]
    pub fn mask_bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Short description used in log output.
    pub fn describe(self) -> &'static str {
        match self {
            DofKind::ShiftX => "X shift",
            DofKind::ShiftY => "Y shift",
            DofKind::ShiftZ => "Z shift",
            DofKind::RotX => "YZ rotation",
            DofKind::RotY => "XZ rotation",
            DofKind::RotZ => "XY rotation",
        }
    }
}

impl fmt::Display for DofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AlignmentMode {
    XYShift,
    XYShiftXYRot,
    XYZShiftXYRot,
    XYShiftYZRotXYRot,
    XYShiftXZRotXYRot,
    XYShiftXZRotYZRotXYRot,
    XYZShiftXZRotYZRotXYRot,
}

const MODE_TABLE: [(AlignmentMode, &[DofKind]); 7] = [
    (AlignmentMode::XYShift, &[ShiftX, ShiftY]),
    (AlignmentMode::XYShiftXYRot, &[ShiftX, ShiftY, RotZ]),
    (AlignmentMode::XYZShiftXYRot, &[ShiftX, ShiftY, RotZ, ShiftZ]),
    (AlignmentMode::XYShiftYZRotXYRot, &[ShiftX, ShiftY, RotZ, RotX]),
    (AlignmentMode::XYShiftXZRotXYRot, &[ShiftX, ShiftY, RotZ, RotY]),
    (
        AlignmentMode::XYShiftXZRotYZRotXYRot,
        &[ShiftX, ShiftY, RotZ, RotY, RotX],
    ),
    (
        AlignmentMode::XYZShiftXZRotYZRotXYRot,
        &[ShiftX, ShiftY, RotZ, ShiftZ, RotY, RotX],
    ),
];

impl AlignmentMode {
    pub const ALL: [AlignmentMode; 7] = [
        AlignmentMode::XYShift,
        AlignmentMode::XYShiftXYRot,
        AlignmentMode::XYZShiftXYRot,
        AlignmentMode::XYShiftYZRotXYRot,
        AlignmentMode::XYShiftXZRotXYRot,
        AlignmentMode::XYShiftXZRotYZRotXYRot,
        AlignmentMode::XYZShiftXZRotYZRotXYRot,
    ];

    /// Integer code of the mode as used in steering configurations (1..=7).
    pub fn code(self) -> i32 {
        self as i32 + 1
    }

    /// Active degrees of freedom, in the slot order used by derivative records.
    pub fn active_dofs(self) -> &'static [DofKind] {
        MODE_TABLE[self as usize].1
    }

    pub fn dof_count(self) -> usize {
        self.active_dofs().len()
    }
}

impl Default for AlignmentMode {
    fn default() -> Self {
        AlignmentMode::XYShiftXYRot
    }
}

impl TryFrom<i32> for AlignmentMode {
    type Error = TelMilleError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1..=7 => Ok(AlignmentMode::ALL[(code - 1) as usize]),
            other => Err(TelMilleError::UnsupportedAlignmentMode(other)),
        }
    }
}

impl From<AlignmentMode> for i32 {
    fn from(mode: AlignmentMode) -> Self {
        mode.code()
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (mode {}, {} dof)", self, self.code(), self.dof_count())
    }
}
