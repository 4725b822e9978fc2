// Joint limits and angle -> servo pulse mapping

use serde::{Deserialize, Serialize};

/// Maestro pulse range in microseconds
pub const SERVO_INPUT_MIN_US: u16 = 992;
pub const SERVO_INPUT_MAX_US: u16 = 2000;

/// Maestro targets are expressed in quarter-microseconds
pub const SERVO_UNIT_MULTIPLIER: u16 = 4;

/// Which joint of a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Coxa,
    Femur,
    Tibia,
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JointKind::Coxa => "coxa",
            JointKind::Femur => "femur",
            JointKind::Tibia => "tibia",
        };
        f.write_str(name)
    }
}

/// Per-joint parameters shared by all six legs (channels come from the channel maps)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Segment length in mm
    pub length: f64,
    pub angle_min: f64,
    pub angle_max: f64,
    #[serde(default = "default_servo_min")]
    pub servo_min: u16,
    #[serde(default = "default_servo_max")]
    pub servo_max: u16,
    /// Optional tighter software limits
    #[serde(default)]
    pub angle_limit_min: Option<f64>,
    #[serde(default)]
    pub angle_limit_max: Option<f64>,
    #[serde(default)]
    pub invert: bool,
    /// Coxa only: vertical offset of the femur pivot
    #[serde(default)]
    pub z_offset: f64,
}

fn default_servo_min() -> u16 {
    SERVO_INPUT_MIN_US * SERVO_UNIT_MULTIPLIER
}

fn default_servo_max() -> u16 {
    SERVO_INPUT_MAX_US * SERVO_UNIT_MULTIPLIER
}

impl JointConfig {
    pub fn new(length: f64, angle_min: f64, angle_max: f64) -> Self {
        Self {
            length,
            angle_min,
            angle_max,
            servo_min: default_servo_min(),
            servo_max: default_servo_max(),
            angle_limit_min: None,
            angle_limit_max: None,
            invert: false,
            z_offset: 0.0,
        }
    }
}

/// Reason an angle was rejected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleViolation {
    pub min: f64,
    pub max: f64,
}

/// A servo-driven joint bound to a controller channel
#[derive(Debug, Clone)]
pub struct Joint {
    pub kind: JointKind,
    pub channel: u8,
    pub config: JointConfig,
}

impl Joint {
    pub fn new(kind: JointKind, channel: u8, config: JointConfig) -> Self {
        Self {
            kind,
            channel,
            config,
        }
    }

    pub fn length(&self) -> f64 {
        self.config.length
    }

    /// Effective limits: hardware range narrowed by the custom limits
    pub fn limits(&self) -> (f64, f64) {
        let min = self
            .config
            .angle_limit_min
            .map_or(self.config.angle_min, |l| l.max(self.config.angle_min));
        let max = self
            .config
            .angle_limit_max
            .map_or(self.config.angle_max, |l| l.min(self.config.angle_max));
        (min, max)
    }

    /// Check an angle (degrees) against the effective limits
    pub fn validate(&self, angle: f64) -> Result<(), AngleViolation> {
        let (min, max) = self.limits();
        if angle.is_finite() && (min..=max).contains(&angle) {
            Ok(())
        } else {
            Err(AngleViolation { min, max })
        }
    }

    /// Map a joint angle to a servo target in quarter-microseconds.
    /// Inverted joints mirror the angle before mapping.
    pub fn angle_to_servo_target(&self, angle: f64) -> u16 {
        let angle = if self.config.invert { -angle } else { angle };
        let target = map_range(
            angle,
            self.config.angle_min,
            self.config.angle_max,
            self.config.servo_min as f64,
            self.config.servo_max as f64,
        );
        target.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

/// Linear re-mapping of `value` from one range to another
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    if in_max == in_min {
        return out_min;
    }
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coxa() -> Joint {
        Joint::new(JointKind::Coxa, 0, JointConfig::new(27.5, -45.0, 45.0))
    }

    #[test]
    fn test_angle_mapping_endpoints() {
        let joint = coxa();
        assert_eq!(joint.angle_to_servo_target(-45.0), 992 * 4);
        assert_eq!(joint.angle_to_servo_target(45.0), 2000 * 4);
        assert_eq!(joint.angle_to_servo_target(0.0), 1496 * 4);
    }

    #[test]
    fn test_inverted_joint_mirrors() {
        let mut joint = coxa();
        joint.config.invert = true;
        assert_eq!(joint.angle_to_servo_target(45.0), 992 * 4);
    }

    #[test]
    fn test_custom_limits_narrow_range() {
        let mut joint = coxa();
        joint.config.angle_limit_max = Some(30.0);
        assert!(joint.validate(30.0).is_ok());
        let err = joint.validate(31.0).unwrap_err();
        assert_eq!(err.max, 30.0);
        assert!(joint.validate(f64::NAN).is_err());
    }

    #[test]
    fn test_map_range_degenerate() {
        assert_eq!(map_range(5.0, 1.0, 1.0, 10.0, 20.0), 10.0);
        assert_eq!(map_range(50.0, 0.0, 100.0, 0.0, 255.0), 127.5);
    }
}
