// Timeouts, topics, robot configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::geometry::Vector3D;
use crate::robot::controller::{LEG_COUNT, LegGeometry, SegmentLimits};
use crate::robot::joint::JointConfig;
use crate::robot::leg::Leg;
use crate::robot::maestro::DEFAULT_BAUDRATE;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DIRECTION: &str = "hexapod/cmd/direction"; // direction + rotation
pub const TOPIC_CMD_GAIT: &str = "hexapod/cmd/gait"; // start / stop / home
pub const TOPIC_HEALTH: &str = "hexapod/state/health"; // health status
pub const TOPIC_GAIT_STATE: &str = "hexapod/state/gait"; // gait telemetry

// Serial port for the Maestro servo controller
pub const SERVO_PORT: &str = "/dev/ttyACM0";

// Maestro channel count (24-channel board)
pub const CONTROLLER_CHANNELS: usize = 24;

/// Error types for loading the robot configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid robot config: {0}")]
    Invalid(String),
}

/// Serial connection to the servo controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: SERVO_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
        }
    }
}

/// Named whole-body poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredefinedPosition {
    LowProfile,
    Upright,
}

/// Foot positions (leg frame) of every predefined pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredefinedPositions {
    pub low_profile: [Vector3D; LEG_COUNT],
    pub upright: [Vector3D; LEG_COUNT],
}

impl PredefinedPositions {
    pub fn get(&self, position: PredefinedPosition) -> &[Vector3D; LEG_COUNT] {
        match position {
            PredefinedPosition::LowProfile => &self.low_profile,
            PredefinedPosition::Upright => &self.upright,
        }
    }
}

impl Default for PredefinedPositions {
    fn default() -> Self {
        Self {
            low_profile: [Vector3D::new(0.0, 40.0, 60.0); LEG_COUNT],
            upright: [Vector3D::ZERO; LEG_COUNT],
        }
    }
}

/// Robot geometry and servo wiring, loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HexapodConfig {
    pub hexagon_side_length: f64,
    pub controller: ControllerConfig,
    /// Servo speed in percent (1-100), 0 = unlimited
    pub speed: u8,
    /// Servo acceleration in percent (1-100), 0 = unlimited
    pub accel: u8,
    /// How long to wait for the Maestro to report motion after a command
    pub motion_start_grace_ms: u64,
    pub coxa: JointConfig,
    pub femur: JointConfig,
    pub tibia: JointConfig,
    pub coxa_channel_map: [u8; LEG_COUNT],
    pub femur_channel_map: [u8; LEG_COUNT],
    pub tibia_channel_map: [u8; LEG_COUNT],
    /// Neutral foot point in the coxa frame
    pub end_effector_offset: Vector3D,
    pub predefined_positions: PredefinedPositions,
}

impl Default for HexapodConfig {
    fn default() -> Self {
        Self {
            hexagon_side_length: 137.0,
            controller: ControllerConfig::default(),
            speed: 25,
            accel: 10,
            motion_start_grace_ms: 200,
            coxa: JointConfig::new(27.5, -45.0, 45.0),
            femur: JointConfig::new(52.5, -90.0, 90.0),
            tibia: JointConfig::new(140.0, -90.0, 90.0),
            coxa_channel_map: [0, 3, 6, 9, 12, 15],
            femur_channel_map: [1, 4, 7, 10, 13, 16],
            tibia_channel_map: [2, 5, 8, 11, 14, 17],
            end_effector_offset: Vector3D::new(0.0, 80.0, -140.0),
            predefined_positions: PredefinedPositions::default(),
        }
    }
}

impl HexapodConfig {
    /// Load from a JSON file; missing fields fall back to the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, joint) in [
            ("coxa", &self.coxa),
            ("femur", &self.femur),
            ("tibia", &self.tibia),
        ] {
            if !(joint.length.is_finite() && joint.length > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} length must be positive, got {}",
                    name, joint.length
                )));
            }
            if joint.angle_min >= joint.angle_max {
                return Err(ConfigError::Invalid(format!(
                    "{} angle range is empty ({} to {})",
                    name, joint.angle_min, joint.angle_max
                )));
            }
        }

        let mut used = [false; CONTROLLER_CHANNELS];
        for &channel in self
            .coxa_channel_map
            .iter()
            .chain(&self.femur_channel_map)
            .chain(&self.tibia_channel_map)
        {
            let slot = used.get_mut(channel as usize).ok_or_else(|| {
                ConfigError::Invalid(format!("channel {} does not exist", channel))
            })?;
            if *slot {
                return Err(ConfigError::Invalid(format!(
                    "channel {} is mapped twice",
                    channel
                )));
            }
            *slot = true;
        }

        if self.speed > 100 || self.accel > 100 {
            return Err(ConfigError::Invalid(
                "speed and accel are percentages (0-100)".to_string(),
            ));
        }

        // The hexapod seeds its joint-angle cache from the low-profile pose
        for leg in self.legs() {
            for position in [PredefinedPosition::LowProfile, PredefinedPosition::Upright] {
                let target = self.predefined_positions.get(position)[leg.index];
                leg.inverse_kinematics(target)
                    .and_then(|angles| leg.validate_angles(angles))
                    .map_err(|e| {
                        ConfigError::Invalid(format!(
                            "{:?} pose unreachable for leg {}: {}",
                            position, leg.index, e
                        ))
                    })?;
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> LegGeometry {
        let limits = |joint: &JointConfig| SegmentLimits {
            length: joint.length,
            angle_min: joint.angle_min,
            angle_max: joint.angle_max,
        };
        LegGeometry {
            coxa: limits(&self.coxa),
            femur: limits(&self.femur),
            tibia: limits(&self.tibia),
            end_effector_offset: self.end_effector_offset,
            coxa_z_offset: self.coxa.z_offset,
            mount_angles: LegGeometry::hexagon_mount_angles(),
            hexagon_side_length: self.hexagon_side_length,
        }
    }

    /// Build the six legs with their channel assignments
    pub fn legs(&self) -> [Leg; LEG_COUNT] {
        std::array::from_fn(|i| {
            Leg::new(
                i,
                &self.coxa,
                &self.femur,
                &self.tibia,
                [
                    self.coxa_channel_map[i],
                    self.femur_channel_map[i],
                    self.tibia_channel_map[i],
                ],
                self.end_effector_offset,
            )
        })
    }

    pub fn motion_start_grace(&self) -> Duration {
        Duration::from_millis(self.motion_start_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HexapodConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geometry().max_reach(), 220.0);
    }

    #[test]
    fn test_predefined_positions_reachable() {
        let config = HexapodConfig::default();
        for leg in config.legs() {
            for position in [PredefinedPosition::LowProfile, PredefinedPosition::Upright] {
                let target = config.predefined_positions.get(position)[leg.index];
                let angles = leg.inverse_kinematics(target).unwrap();
                assert!(leg.validate_angles(angles).is_ok());
            }
        }
    }

    #[test]
    fn test_unreachable_pose_rejected() {
        let mut config = HexapodConfig::default();
        config.predefined_positions.low_profile[3] = Vector3D::new(0.0, 300.0, 0.0);
        match config.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("leg 3"), "{}", msg),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut config = HexapodConfig::default();
        config.tibia_channel_map[5] = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = HexapodConfig::default();
        config.coxa_channel_map[0] = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HexapodConfig =
            serde_json::from_str(r#"{"hexagon_side_length": 120.0, "speed": 50}"#).unwrap();
        assert_eq!(config.hexagon_side_length, 120.0);
        assert_eq!(config.speed, 50);
        assert_eq!(config.coxa_channel_map, [0, 3, 6, 9, 12, 15]);
    }

    #[test]
    fn test_legs_use_channel_maps() {
        let legs = HexapodConfig::default().legs();
        assert_eq!(legs[2].coxa.channel, 6);
        assert_eq!(legs[2].femur.channel, 7);
        assert_eq!(legs[2].tibia.channel, 8);
    }
}
