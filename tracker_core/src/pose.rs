/*!
Pose assembly from frame fields and operator offsets.
*/

use serde::{Deserialize, Serialize};
use crate::frame::{Field, Frame};
use crate::protocol::{MILLIMETRES_TO_METRES, ROTATION_SCALE, TRANSLATION_SCALE};

/// A 3-component vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    pub const ZERO: Axes = Axes { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for Axes {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Operator-supplied offsets added to every decoded pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseOffsets {
    pub translate: Axes,
    pub rotate: Axes,
}

/// Decoded camera position (metres) and rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

fn rotation(frame: &Frame, field: Field) -> f64 {
    f64::from(frame.raw(field)) / ROTATION_SCALE
}

fn translation(frame: &Frame, field: Field) -> f64 {
    f64::from(frame.raw(field)) / TRANSLATION_SCALE * MILLIMETRES_TO_METRES
}

/// Convert a validated frame into a pose, applying `offsets`
pub fn assemble(frame: &Frame, offsets: &PoseOffsets) -> Pose {
    Pose {
        tx: translation(frame, Field::TranslateX) + offsets.translate.x,
        ty: translation(frame, Field::TranslateY) + offsets.translate.y,
        tz: translation(frame, Field::TranslateZ) + offsets.translate.z,
        rx: rotation(frame, Field::RotateX) + offsets.rotate.x,
        ry: rotation(frame, Field::RotateY) + offsets.rotate.y,
        rz: rotation(frame, Field::RotateZ) + offsets.rotate.z,
    }
}
