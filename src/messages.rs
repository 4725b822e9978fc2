// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::gait::{DirectionInput, GaitKind, GaitStats};

// Direction command from teleop/scripts -> runtime
// x/y follow the body frame (+x right, +y forward); rotation > 0 turns clockwise
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DirectionCommand {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl From<&DirectionCommand> for DirectionInput {
    fn from(cmd: &DirectionCommand) -> Self {
        DirectionInput::new((cmd.x, cmd.y), cmd.rotation)
    }
}

// Gait lifecycle command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GaitCommand {
    /// Start walking, optionally switching gait first
    Start {
        #[serde(default)]
        gait: Option<GaitKind>,
    },
    /// Stop after the current phase
    Stop,
    /// Stop and bring every leg back to neutral
    Home,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

/// Gait state published by runtime
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GaitTelemetry {
    #[serde(flatten)]
    pub stats: GaitStats,
    pub direction: DirectionInput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector2D;

    #[test]
    fn test_direction_command_parse() {
        let cmd: DirectionCommand = serde_json::from_str(r#"{"x": 0.5, "y": 1.0}"#).unwrap();
        assert_eq!(cmd.rotation, 0.0);
        let input = DirectionInput::from(&cmd);
        assert_eq!(input.direction, Vector2D::new(0.5, 1.0));
    }

    #[test]
    fn test_gait_command_parse() {
        let cmd: GaitCommand = serde_json::from_str(r#"{"action": "start", "gait": "wave"}"#).unwrap();
        assert_eq!(cmd, GaitCommand::Start { gait: Some(GaitKind::Wave) });
        let cmd: GaitCommand = serde_json::from_str(r#"{"action": "start"}"#).unwrap();
        assert_eq!(cmd, GaitCommand::Start { gait: None });
        let cmd: GaitCommand = serde_json::from_str(r#"{"action": "home"}"#).unwrap();
        assert_eq!(cmd, GaitCommand::Home);
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(), "\"cmd_stale\"");
    }

    #[test]
    fn test_telemetry_is_flat() {
        let telemetry = GaitTelemetry {
            stats: GaitStats {
                cycles: 4,
                ..Default::default()
            },
            direction: DirectionInput::default(),
        };
        let value = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(value["cycles"], 4);
        assert_eq!(value["direction"]["rotation"], 0.0);
    }
}
