// Gait parameters and their validation

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{GaitError, Result};

/// Parameters of a gait run. Fixed once the gait is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    /// Radius of the step circle, mm
    pub step_radius: f64,
    /// Swing lift above the higher end of the step, mm
    pub leg_lift_distance: f64,
    /// Extra lift per mm of horizontal travel
    pub leg_lift_incline: f64,
    /// Body height above the neutral foot plane, mm (feet sit at -stance_height)
    pub stance_height: f64,
    /// Minimum time to hold each phase, seconds
    pub dwell_time: f64,
    /// IMU deviation bound for the advisory stability check
    pub stability_threshold: f64,
    /// Stance legs push across the whole step circle instead of returning to its centre
    pub use_full_circle_stance: bool,
    /// Waypoints per leg per phase
    pub transition_steps: usize,
    /// Upper bound on a single motion-complete wait, seconds
    pub motion_timeout: f64,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            step_radius: 30.0,
            leg_lift_distance: 20.0,
            leg_lift_incline: 0.0,
            stance_height: 0.0,
            dwell_time: 0.5,
            stability_threshold: 0.2,
            use_full_circle_stance: false,
            transition_steps: 5,
            motion_timeout: 2.0,
        }
    }
}

impl GaitConfig {
    /// Reject parameters the engine cannot run with. Values are never corrected.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("step_radius", self.step_radius),
            ("leg_lift_distance", self.leg_lift_distance),
            ("leg_lift_incline", self.leg_lift_incline),
            ("stance_height", self.stance_height),
            ("dwell_time", self.dwell_time),
            ("stability_threshold", self.stability_threshold),
            ("motion_timeout", self.motion_timeout),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GaitError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
        }

        for (name, value) in [
            ("step_radius", self.step_radius),
            ("leg_lift_distance", self.leg_lift_distance),
            ("leg_lift_incline", self.leg_lift_incline),
            ("stability_threshold", self.stability_threshold),
        ] {
            if value < 0.0 {
                return Err(GaitError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        if self.dwell_time <= 0.0 {
            return Err(GaitError::InvalidConfig(format!(
                "dwell_time must be positive, got {}",
                self.dwell_time
            )));
        }
        if self.motion_timeout <= 0.0 {
            return Err(GaitError::InvalidConfig(format!(
                "motion_timeout must be positive, got {}",
                self.motion_timeout
            )));
        }
        if self.transition_steps == 0 {
            return Err(GaitError::InvalidConfig(
                "transition_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs_f64(self.dwell_time)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.motion_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GaitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_radius_rejected() {
        let config = GaitConfig {
            step_radius: -5.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GaitError::InvalidConfig(ref msg) if msg.contains("step_radius")));
    }

    #[test]
    fn test_dwell_time_must_be_positive() {
        for dwell_time in [0.0, -0.1, f64::NAN] {
            let config = GaitConfig {
                dwell_time,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "dwell_time {} accepted", dwell_time);
        }
    }

    #[test]
    fn test_zero_transition_steps_rejected() {
        let config = GaitConfig {
            transition_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: GaitConfig =
            serde_json::from_str(r#"{"step_radius": 40.0, "use_full_circle_stance": true}"#).unwrap();
        assert_eq!(config.step_radius, 40.0);
        assert!(config.use_full_circle_stance);
        assert_eq!(config.transition_steps, 5);
    }
}
