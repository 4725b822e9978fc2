// IMU interface and the advisory stability check run between gait phases

use tracing::warn;

use crate::geometry::Vector3D;

/// Standard gravity in m/s^2
pub const GRAVITY: f64 = 9.81;

/// Error types for IMU reads
#[derive(Debug, thiserror::Error)]
pub enum ImuError {
    #[error("IMU read failed: {0}")]
    Read(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImuError>;

/// Inertial sensor polled by the gait engine
pub trait Imu: Send {
    /// Linear acceleration in m/s^2, body frame
    fn get_acceleration(&mut self) -> Result<Vector3D>;

    /// Angular rate in rad/s, body frame
    fn get_gyroscope(&mut self) -> Result<Vector3D>;
}

/// Body roll and pitch in degrees from a gravity reading
pub fn tilt_from_acceleration(accel: Vector3D) -> (f64, f64) {
    let roll = accel.y.atan2(accel.z).to_degrees();
    let pitch = (-accel.x).atan2(accel.y.hypot(accel.z)).to_degrees();
    (roll, pitch)
}

/// Logged when the body is shaking or tilting more than the threshold allows.
/// Never turned into an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityWarning {
    /// | |accel| - g |
    pub accel_deviation: f64,
    pub gyro_magnitude: f64,
    pub threshold: f64,
    pub roll: f64,
    pub pitch: f64,
}

/// Compares one IMU sample against the stability threshold
#[derive(Debug, Clone, Copy)]
pub struct StabilityMonitor {
    threshold: f64,
}

impl StabilityMonitor {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate a sample. Stable when both the acceleration deviation from
    /// gravity and the angular rate stay below the threshold.
    pub fn evaluate(&self, accel: Vector3D, gyro: Vector3D) -> Option<StabilityWarning> {
        let accel_deviation = (accel.magnitude() - GRAVITY).abs();
        let gyro_magnitude = gyro.magnitude();
        if accel_deviation < self.threshold && gyro_magnitude < self.threshold {
            return None;
        }
        let (roll, pitch) = tilt_from_acceleration(accel);
        Some(StabilityWarning {
            accel_deviation,
            gyro_magnitude,
            threshold: self.threshold,
            roll,
            pitch,
        })
    }

    /// Sample the IMU and log a warning if unstable. Read failures are logged and skipped.
    pub fn check(&self, imu: &mut dyn Imu) -> Option<StabilityWarning> {
        let sample = imu
            .get_acceleration()
            .and_then(|accel| Ok((accel, imu.get_gyroscope()?)));
        let (accel, gyro) = match sample {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Skipping stability check: {}", e);
                return None;
            }
        };

        let warning = self.evaluate(accel, gyro)?;
        warn!(
            "Stability warning: accel deviation {:.2}, gyro {:.2} (threshold {:.2}), roll {:.1}°, pitch {:.1}°",
            warning.accel_deviation, warning.gyro_magnitude, warning.threshold, warning.roll, warning.pitch
        );
        Some(warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedImu {
        accel: Vector3D,
        gyro: Vector3D,
        fail: bool,
    }

    impl Imu for FixedImu {
        fn get_acceleration(&mut self) -> Result<Vector3D> {
            if self.fail {
                return Err(ImuError::Read("bus timeout".to_string()));
            }
            Ok(self.accel)
        }

        fn get_gyroscope(&mut self) -> Result<Vector3D> {
            Ok(self.gyro)
        }
    }

    #[test]
    fn test_level_and_still_is_stable() {
        let monitor = StabilityMonitor::new(0.2);
        assert!(monitor
            .evaluate(Vector3D::new(0.0, 0.0, GRAVITY), Vector3D::ZERO)
            .is_none());
    }

    #[test]
    fn test_shaking_is_flagged() {
        let monitor = StabilityMonitor::new(0.2);
        let warning = monitor
            .evaluate(Vector3D::new(0.0, 0.0, GRAVITY), Vector3D::new(0.5, 0.0, 0.0))
            .unwrap();
        assert!((warning.gyro_magnitude - 0.5).abs() < 1e-9);

        let warning = monitor
            .evaluate(Vector3D::new(0.0, 0.0, 12.0), Vector3D::ZERO)
            .unwrap();
        assert!((warning.accel_deviation - 2.19).abs() < 1e-9);
    }

    #[test]
    fn test_tilt_from_acceleration() {
        let (roll, pitch) = tilt_from_acceleration(Vector3D::new(0.0, 0.0, GRAVITY));
        assert!(roll.abs() < 1e-9 && pitch.abs() < 1e-9);

        let (roll, _) = tilt_from_acceleration(Vector3D::new(0.0, 1.0, 1.0));
        assert!((roll - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_failure_is_not_a_warning() {
        let mut imu = FixedImu {
            accel: Vector3D::ZERO,
            gyro: Vector3D::ZERO,
            fail: true,
        };
        assert!(StabilityMonitor::new(0.2).check(&mut imu).is_none());

        imu.fail = false;
        assert!(StabilityMonitor::new(0.2).check(&mut imu).is_some());
    }
}
