// Leg target calculation on the step circle
//
// Each leg has a local frame: +Y points outward along the leg's mounting
// angle, +X is +Y rotated 90° clockwise. Body motion is projected into that
// frame and the foot target is placed on a circle around the neutral point.

use tracing::{debug, warn};

use super::config::GaitConfig;
use super::input::DirectionInput;
use crate::geometry::{Vector2D, Vector3D};
use crate::robot::controller::{LEG_COUNT, LegGeometry};

/// Fraction of the maximum reach an out-of-reach target is pulled back to
pub const REACH_SAFETY_MARGIN: f64 = 0.8;

/// Axes of one leg's local frame, expressed in the body frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegFrame {
    pub x_axis: Vector2D,
    pub y_axis: Vector2D,
}

impl LegFrame {
    pub fn from_mount_angle(angle_deg: f64) -> Self {
        let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
        Self {
            x_axis: Vector2D::new(sin_a, -cos_a),
            y_axis: Vector2D::new(cos_a, sin_a),
        }
    }

    /// Body-frame vector into leg-local coordinates
    pub fn to_local(&self, body: Vector2D) -> Vector2D {
        Vector2D::new(body.dot(self.x_axis), body.dot(self.y_axis))
    }

    /// Leg-local vector back into the body frame
    pub fn to_body(&self, local: Vector2D) -> Vector2D {
        self.x_axis * local.x + self.y_axis * local.y
    }
}

/// Point where the ray from `origin` along `direction` leaves the circle of
/// `radius` centred at the origin.
///
/// A zero direction gives the centre-forward point `(0, radius)`. If the ray
/// never reaches the circle (origin outside and pointing away) the closest
/// point on the circle to `origin` is returned.
pub fn project_to_circle(radius: f64, origin: Vector2D, direction: Vector2D) -> Vector2D {
    let dir = direction.normalized();
    if dir == Vector2D::ZERO {
        return Vector2D::new(0.0, radius);
    }

    // |origin + t * dir| = radius, take the far root
    let b = origin.dot(dir);
    let c = origin.dot(origin) - radius * radius;
    let discriminant = b * b - c;
    if discriminant >= 0.0 {
        let t = -b + discriminant.sqrt();
        if t >= 0.0 {
            return origin + dir * t;
        }
    }

    let fallback = origin.normalized();
    if fallback == Vector2D::ZERO {
        dir * radius
    } else {
        fallback * radius
    }
}

/// Computes swing and stance foot targets for every leg
#[derive(Debug, Clone)]
pub struct TargetCalculator {
    step_radius: f64,
    stance_height: f64,
    use_full_circle_stance: bool,
    frames: [LegFrame; LEG_COUNT],
    geometry: LegGeometry,
}

impl TargetCalculator {
    pub fn new(config: &GaitConfig, geometry: &LegGeometry) -> Self {
        Self {
            step_radius: config.step_radius,
            stance_height: config.stance_height,
            use_full_circle_stance: config.use_full_circle_stance,
            frames: geometry.mount_angles.map(LegFrame::from_mount_angle),
            geometry: geometry.clone(),
        }
    }

    pub fn frame(&self, leg: usize) -> &LegFrame {
        &self.frames[leg]
    }

    /// Neutral foot position at stance height
    pub fn neutral(&self) -> Vector3D {
        Vector3D::new(0.0, 0.0, -self.stance_height)
    }

    /// Requested foot motion in the leg frame. A non-zero rotation turns on
    /// the spot and takes priority over the translation; positive rotation
    /// maps to local +X (tangential).
    pub fn local_motion(&self, leg: usize, input: &DirectionInput) -> Vector2D {
        if input.rotation != 0.0 {
            Vector2D::new(input.rotation, 0.0)
        } else {
            self.frames[leg].to_local(input.direction)
        }
    }

    /// Where a swinging leg lands. Its distance from the neutral point is
    /// `step_radius` scaled by the input magnitude.
    pub fn swing_target(&self, leg: usize, input: &DirectionInput) -> Vector3D {
        let motion = self.local_motion(leg, input);
        if motion == Vector2D::ZERO {
            return self.neutral();
        }
        let radius = self.step_radius * motion.magnitude();
        let target = project_to_circle(radius, Vector2D::ZERO, motion);
        self.finish(leg, target)
    }

    /// Where a planted leg pushes to from `current`
    pub fn stance_target(&self, leg: usize, input: &DirectionInput, current: Vector3D) -> Vector3D {
        let motion = self.local_motion(leg, input);
        if motion == Vector2D::ZERO || !self.use_full_circle_stance {
            // Half-circle stance: drag back to the centre, never through the swing side
            return self.finish(leg, Vector2D::ZERO);
        }
        let radius = self.step_radius * motion.magnitude();
        let target = project_to_circle(radius, current.xy(), -motion);
        self.finish(leg, target)
    }

    pub fn leg_target(
        &self,
        leg: usize,
        input: &DirectionInput,
        current: Vector3D,
        is_swing: bool,
    ) -> Vector3D {
        if is_swing {
            self.swing_target(leg, input)
        } else {
            self.stance_target(leg, input, current)
        }
    }

    fn finish(&self, leg: usize, planar: Vector2D) -> Vector3D {
        let target = planar.with_z(-self.stance_height);
        let clamped = self.clamp_to_reach(target);
        debug!("Leg {} target {}", leg, clamped);
        clamped
    }

    /// Horizontal coxa-to-foot reach for a target at leg-local height `z`.
    /// Never more than coxa + femur + tibia.
    pub fn reach_at(&self, z: f64) -> f64 {
        let dz = z + self.geometry.end_effector_offset.z - self.geometry.coxa_z_offset;
        self.geometry.reach_at_height(dz).min(self.geometry.max_reach())
    }

    /// Pull a target whose planar distance from the coxa exceeds the leg's
    /// reach at that height back to the safety margin
    pub fn clamp_to_reach(&self, target: Vector3D) -> Vector3D {
        let offset = self.geometry.end_effector_offset.xy();
        let from_coxa = target.xy() + offset;
        let distance = from_coxa.magnitude();
        let reach = self.reach_at(target.z);
        if distance <= reach {
            return target;
        }
        let limit = reach * REACH_SAFETY_MARGIN;
        warn!(
            "Target {} is {:.1}mm from the coxa (reach {:.1}mm), clamping to {:.1}mm",
            target, distance, reach, limit
        );
        let planar = from_coxa.normalized() * limit - offset;
        planar.with_z(target.z)
    }
}
