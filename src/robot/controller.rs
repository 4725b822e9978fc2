// Leg kinematics adapter interface consumed by the gait engine
//
// The adapter owns the servo bus and the per-leg position cache. The gait
// engine only calls through this trait and never talks to the bus itself.

use serde::{Deserialize, Serialize};

use super::joint::JointKind;
use super::maestro::MaestroError;
use crate::geometry::Vector3D;

/// Number of legs on the hexapod
pub const LEG_COUNT: usize = 6;

/// Human-readable leg names, indexed by leg number
pub const LEG_NAMES: [&str; LEG_COUNT] = [
    "right",
    "right front",
    "left front",
    "left",
    "left back",
    "right back",
];

/// Length and angle range of one leg segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentLimits {
    pub length: f64,
    pub angle_min: f64,
    pub angle_max: f64,
}

/// Static geometry every leg shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegGeometry {
    pub coxa: SegmentLimits,
    pub femur: SegmentLimits,
    pub tibia: SegmentLimits,
    /// Neutral foot point expressed in the coxa frame
    pub end_effector_offset: Vector3D,
    /// Height of the femur pivot above the coxa pivot
    #[serde(default)]
    pub coxa_z_offset: f64,
    /// Mounting angle of each leg around the body, degrees (0 = right, CCW)
    pub mount_angles: [f64; LEG_COUNT],
    /// Side length of the body hexagon (equals its circumradius)
    pub hexagon_side_length: f64,
}

impl LegGeometry {
    /// Regular hexagon: legs at 0, 60, ..., 300 degrees
    pub fn hexagon_mount_angles() -> [f64; LEG_COUNT] {
        std::array::from_fn(|i| i as f64 * 60.0)
    }

    /// Fully stretched leg length: coxa + femur + tibia
    pub fn max_reach(&self) -> f64 {
        self.coxa.length + self.femur.length + self.tibia.length
    }

    /// Largest horizontal coxa-to-foot distance at which the femur/tibia
    /// triangle still closes, for a foot `dz` below (negative) the femur pivot
    pub fn reach_at_height(&self, dz: f64) -> f64 {
        let leg = self.femur.length + self.tibia.length;
        if dz.abs() >= leg {
            return self.coxa.length;
        }
        self.coxa.length + (leg * leg - dz * dz).sqrt()
    }

    /// Distance from the body centre to a neutral foot
    pub fn end_effector_radius(&self) -> f64 {
        self.hexagon_side_length + self.coxa.length + self.femur.length
    }
}

/// Joint angles of one leg in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub coxa: f64,
    pub femur: f64,
    pub tibia: f64,
}

impl JointAngles {
    pub const fn new(coxa: f64, femur: f64, tibia: f64) -> Self {
        Self { coxa, femur, tibia }
    }
}

/// Error types for leg commands
#[derive(Debug, thiserror::Error)]
pub enum LegError {
    #[error("Leg {leg} target {target} is out of reach ({distance:.1}mm > {max_reach:.1}mm)")]
    OutOfReach {
        leg: usize,
        target: Vector3D,
        distance: f64,
        max_reach: f64,
    },

    #[error("Leg {leg} {joint} angle {angle:.2}° is out of limits ({min}° to {max}°)")]
    AngleOutOfRange {
        leg: usize,
        joint: JointKind,
        angle: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid leg index {0}")]
    InvalidLeg(usize),

    #[error("Servo bus error: {0}")]
    Bus(#[from] MaestroError),
}

pub type Result<T> = std::result::Result<T, LegError>;

/// Leg-level control of the hexapod (hardware or simulated)
pub trait LegController: Send {
    /// Geometry the gait engine uses for reach limits and leg frames
    fn geometry(&self) -> &LegGeometry;

    /// Last commanded foot position of every leg, leg-local frame
    fn current_leg_positions(&self) -> [Vector3D; LEG_COUNT];

    /// Command one leg's foot to `target` (leg-local frame).
    /// On error nothing is sent and the position cache is unchanged.
    fn move_leg(&mut self, leg: usize, target: Vector3D) -> Result<()>;

    /// Command every leg at once; all targets are validated before anything is sent
    fn move_all_legs(&mut self, targets: &[Vector3D; LEG_COUNT]) -> Result<()>;

    /// Command every leg's joint angles at once
    fn move_all_legs_angles(&mut self, angles: &[JointAngles; LEG_COUNT]) -> Result<()>;

    /// True while any servo is still travelling
    fn is_moving(&mut self) -> Result<bool>;

    /// How long to wait for motion to be reported after a command before
    /// assuming it already finished
    fn motion_start_grace(&self) -> std::time::Duration {
        std::time::Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> LegGeometry {
        LegGeometry {
            coxa: SegmentLimits { length: 27.5, angle_min: -45.0, angle_max: 45.0 },
            femur: SegmentLimits { length: 52.5, angle_min: -90.0, angle_max: 90.0 },
            tibia: SegmentLimits { length: 140.0, angle_min: -90.0, angle_max: 90.0 },
            end_effector_offset: Vector3D::new(0.0, 80.0, -140.0),
            coxa_z_offset: 0.0,
            mount_angles: LegGeometry::hexagon_mount_angles(),
            hexagon_side_length: 137.0,
        }
    }

    #[test]
    fn test_hexagon_mount_angles() {
        assert_eq!(
            LegGeometry::hexagon_mount_angles(),
            [0.0, 60.0, 120.0, 180.0, 240.0, 300.0]
        );
    }

    #[test]
    fn test_derived_lengths() {
        let g = geometry();
        assert_eq!(g.max_reach(), 220.0);
        assert_eq!(g.end_effector_radius(), 217.0);
        // Straight down the femur/tibia chain reaches no further than the coxa
        assert_eq!(g.reach_at_height(-192.5), 27.5);
        assert_eq!(g.reach_at_height(0.0), 220.0);
        assert!((g.reach_at_height(-140.0) - 159.622).abs() < 1e-3);
    }
}
