// Single-leg inverse and forward kinematics
//
// Leg frame: +Y outward along the leg, +X to its right, +Z up. Positions are
// relative to the neutral foot point; `end_effector_offset` moves them into
// the coxa frame (coxa pivot at the origin).

use tracing::debug;

use super::controller::{JointAngles, LegError, Result};
use super::joint::{Joint, JointConfig, JointKind};
use crate::geometry::Vector3D;

/// Femur and tibia angles are measured from the horizontal / perpendicular pose
const FEMUR_ANGLE_OFFSET: f64 = -90.0;
const TIBIA_ANGLE_OFFSET: f64 = -90.0;

/// Round to hundredths and fold -0.0 into 0.0
fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// One leg: three joints plus its neutral foot offset
#[derive(Debug, Clone)]
pub struct Leg {
    pub index: usize,
    pub coxa: Joint,
    pub femur: Joint,
    pub tibia: Joint,
    pub end_effector_offset: Vector3D,
}

impl Leg {
    /// `channels` is [coxa, femur, tibia]
    pub fn new(
        index: usize,
        coxa: &JointConfig,
        femur: &JointConfig,
        tibia: &JointConfig,
        channels: [u8; 3],
        end_effector_offset: Vector3D,
    ) -> Self {
        Self {
            index,
            coxa: Joint::new(JointKind::Coxa, channels[0], coxa.clone()),
            femur: Joint::new(JointKind::Femur, channels[1], femur.clone()),
            tibia: Joint::new(JointKind::Tibia, channels[2], tibia.clone()),
            end_effector_offset,
        }
    }

    fn coxa_z_offset(&self) -> f64 {
        self.coxa.config.z_offset
    }

    /// Joint angles (degrees) that put the foot at `target`
    pub fn inverse_kinematics(&self, target: Vector3D) -> Result<JointAngles> {
        let p = target + self.end_effector_offset;
        let coxa_len = self.coxa.length();
        let femur_len = self.femur.length();
        let tibia_len = self.tibia.length();

        let coxa_angle = p.x.atan2(p.y);
        let horizontal = p.x.hypot(p.y);
        let dz = p.z - self.coxa_z_offset();
        let f = (horizontal - coxa_len).hypot(dz);

        // The femur/tibia triangle must close: F within (|femur - tibia|, femur + tibia)
        let max_reach = femur_len + tibia_len;
        if f >= max_reach || f <= (femur_len - tibia_len).abs() || !f.is_finite() {
            return Err(LegError::OutOfReach {
                leg: self.index,
                target,
                distance: f,
                max_reach,
            });
        }

        let alpha1 = (horizontal - coxa_len).atan2(dz.abs());
        let alpha2 = ((tibia_len.powi(2) - femur_len.powi(2) - f.powi(2))
            / (-2.0 * femur_len * f))
            .clamp(-1.0, 1.0)
            .acos();
        let beta = ((f.powi(2) - femur_len.powi(2) - tibia_len.powi(2))
            / (-2.0 * femur_len * tibia_len))
            .clamp(-1.0, 1.0)
            .acos();

        let angles = JointAngles::new(
            round2(coxa_angle.to_degrees()),
            round2(alpha1.to_degrees() + alpha2.to_degrees() + FEMUR_ANGLE_OFFSET),
            round2(beta.to_degrees() + TIBIA_ANGLE_OFFSET),
        );
        debug!("Leg {} IK {} -> {:?}", self.index, target, angles);
        Ok(angles)
    }

    /// Foot position for the given joint angles
    pub fn forward_kinematics(&self, angles: JointAngles) -> Vector3D {
        let coxa_len = self.coxa.length();
        let femur_len = self.femur.length();
        let tibia_len = self.tibia.length();

        let coxa = angles.coxa.to_radians();
        let femur = angles.femur.to_radians();
        let beta = (angles.tibia - TIBIA_ANGLE_OFFSET).to_radians();
        let (sin_c, cos_c) = coxa.sin_cos();

        let femur_horizontal = femur_len * femur.cos();
        let f = (femur_len.powi(2) + tibia_len.powi(2) - 2.0 * femur_len * tibia_len * beta.cos())
            .sqrt();
        let alpha2 = ((femur_len.powi(2) + f.powi(2) - tibia_len.powi(2)) / (2.0 * femur_len * f))
            .clamp(-1.0, 1.0)
            .acos();
        let alpha3 = alpha2 - femur;
        let foot_horizontal = f * alpha3.cos();
        let foot_drop = f * alpha3.sin();

        let reach = coxa_len + femur_horizontal + (foot_horizontal - femur_horizontal);
        let p = Vector3D::new(
            reach * sin_c,
            reach * cos_c,
            -foot_drop + self.coxa_z_offset(),
        ) - self.end_effector_offset;

        Vector3D::new(round2(p.x), round2(p.y), round2(p.z))
    }

    /// Check all three angles against their joint limits
    pub fn validate_angles(&self, angles: JointAngles) -> Result<()> {
        for (joint, angle) in [
            (&self.coxa, angles.coxa),
            (&self.femur, angles.femur),
            (&self.tibia, angles.tibia),
        ] {
            joint
                .validate(angle)
                .map_err(|violation| LegError::AngleOutOfRange {
                    leg: self.index,
                    joint: joint.kind,
                    angle,
                    min: violation.min,
                    max: violation.max,
                })?;
        }
        Ok(())
    }

    /// (channel, target) pairs for the three servos
    pub fn servo_targets(&self, angles: JointAngles) -> [(u8, u16); 3] {
        [
            (self.coxa.channel, self.coxa.angle_to_servo_target(angles.coxa)),
            (self.femur.channel, self.femur.angle_to_servo_target(angles.femur)),
            (self.tibia.channel, self.tibia.angle_to_servo_target(angles.tibia)),
        ]
    }
}
