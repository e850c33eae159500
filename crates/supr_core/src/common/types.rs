use enum_map::Enum;
use num_derive::FromPrimitive;
use strum_macros::Display;

/// Gender of a loaded model archive
#[derive(Clone, Copy, Debug, Enum, FromPrimitive, PartialEq, Display)]
pub enum Gender {
    Neutral = 0,
    Male,
    Female,
}

/// Floating-point precision for the internal computation. Chosen once per
/// container; the archive arrays are cast at load time.
#[derive(Clone, Copy, Debug, Enum, FromPrimitive, PartialEq, Display)]
pub enum Precision {
    F32 = 0,
    F64,
}

/// Pose-dependent blend-shape feature a model archive was trained against,
/// derived from the trailing `posedirs` dimension at load time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PoseFeatureKind {
    /// Unit quaternion minus identity, 4 values per joint including the root.
    Quaternion,
    /// Flattened rotation matrix minus identity, 9 values per non-root joint.
    RotationMatrix,
}
