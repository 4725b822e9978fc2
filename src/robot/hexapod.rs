// High-level hexapod driver
//
// Combines the leg kinematics and the Maestro protocol to provide the
// leg-level API the gait engine drives.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::controller::{JointAngles, LEG_COUNT, LegController, LegError, LegGeometry, Result};
use super::joint::map_range;
use super::leg::Leg;
use super::maestro::{MaestroBus, ServoBus};
use crate::config::{CONTROLLER_CHANNELS, HexapodConfig, PredefinedPosition, PredefinedPositions};
use crate::geometry::Vector3D;

/// Maestro speed/acceleration register maximum
const MAESTRO_RATE_MAX: f64 = 255.0;

/// Convert a 1-100 percentage into the Maestro 1-255 range (0 stays unlimited)
pub fn percent_to_maestro(percent: u8) -> u16 {
    if percent == 0 {
        return 0;
    }
    let percent = percent.min(100) as f64;
    map_range(percent, 1.0, 100.0, 1.0, MAESTRO_RATE_MAX).round() as u16
}

/// Six-legged robot driven through a servo bus
pub struct Hexapod<B: ServoBus> {
    bus: B,
    legs: [Leg; LEG_COUNT],
    geometry: LegGeometry,
    predefined_positions: PredefinedPositions,
    motion_start_grace: Duration,
    current_positions: [Vector3D; LEG_COUNT],
    current_angles: [JointAngles; LEG_COUNT],
}

impl Hexapod<MaestroBus> {
    /// Open the Maestro named in the config and apply the speed/accel settings
    pub fn open(config: &HexapodConfig) -> Result<Self> {
        info!("Opening servo bus on {}", config.controller.port);
        let bus = MaestroBus::open_with_baudrate(&config.controller.port, config.controller.baudrate)?;
        let mut hexapod = Self::new(bus, config);
        hexapod.set_all_servos_speed(config.speed)?;
        hexapod.set_all_servos_accel(config.accel)?;
        Ok(hexapod)
    }
}

impl<B: ServoBus> Hexapod<B> {
    /// Wrap an already-open bus. The position cache starts at the low-profile pose.
    pub fn new(bus: B, config: &HexapodConfig) -> Self {
        let legs = config.legs();
        let current_positions = config.predefined_positions.low_profile;
        let current_angles = std::array::from_fn(|i| {
            match legs[i].inverse_kinematics(current_positions[i]) {
                Ok(angles) => angles,
                Err(e) => {
                    warn!("Leg {} low-profile pose unreachable ({}), angle cache zeroed", i, e);
                    JointAngles::default()
                }
            }
        });
        Self {
            bus,
            legs,
            geometry: config.geometry(),
            predefined_positions: config.predefined_positions.clone(),
            motion_start_grace: config.motion_start_grace(),
            current_positions,
            current_angles,
        }
    }

    fn leg(&self, index: usize) -> Result<&Leg> {
        self.legs.get(index).ok_or(LegError::InvalidLeg(index))
    }

    fn servo_channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.legs
            .iter()
            .flat_map(|leg| [leg.coxa.channel, leg.femur.channel, leg.tibia.channel])
    }

    /// Set the speed limit of every leg servo, percent 1-100 or 0 for unlimited
    pub fn set_all_servos_speed(&mut self, percent: u8) -> Result<()> {
        let speed = percent_to_maestro(percent);
        info!("Setting servo speed to {}% ({})", percent, speed);
        let channels: Vec<u8> = self.servo_channels().collect();
        for channel in channels {
            self.bus.set_speed(channel, speed)?;
        }
        Ok(())
    }

    /// Set the acceleration limit of every leg servo, percent 1-100 or 0 for unlimited
    pub fn set_all_servos_accel(&mut self, percent: u8) -> Result<()> {
        let accel = percent_to_maestro(percent);
        info!("Setting servo acceleration to {}% ({})", percent, accel);
        let channels: Vec<u8> = self.servo_channels().collect();
        for channel in channels {
            self.bus.set_acceleration(channel, accel)?;
        }
        Ok(())
    }

    /// Move every leg to a named pose
    pub fn move_to_position(&mut self, position: PredefinedPosition) -> Result<()> {
        info!("Moving to {:?} position", position);
        let targets = *self.predefined_positions.get(position);
        self.move_all_legs(&targets)
    }

    /// Park in the low-profile pose, then switch off every channel's pulses
    pub fn deactivate_all_servos(&mut self) -> Result<()> {
        self.move_to_position(PredefinedPosition::LowProfile)?;
        self.wait_for_idle(Duration::from_secs(3))?;

        info!("Deactivating all servos");
        let targets: Vec<(u8, u16)> = (0..CONTROLLER_CHANNELS as u8).map(|ch| (ch, 0)).collect();
        self.bus.set_multiple_targets(&targets)?;
        Ok(())
    }

    /// Poll the moving state until idle or `timeout` elapses
    fn wait_for_idle(&mut self, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if !self.bus.get_moving_state()? {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        warn!("Servos still moving after {:?}", timeout);
        Ok(())
    }

    /// Last commanded joint angles of every leg
    pub fn current_leg_angles(&self) -> [JointAngles; LEG_COUNT] {
        self.current_angles
    }

    fn sync_positions_from_angles(&mut self) {
        for (i, leg) in self.legs.iter().enumerate() {
            self.current_positions[i] = leg.forward_kinematics(self.current_angles[i]);
        }
    }
}

impl<B: ServoBus> LegController for Hexapod<B> {
    fn geometry(&self) -> &LegGeometry {
        &self.geometry
    }

    fn current_leg_positions(&self) -> [Vector3D; LEG_COUNT] {
        self.current_positions
    }

    fn move_leg(&mut self, leg: usize, target: Vector3D) -> Result<()> {
        let l = self.leg(leg)?;
        let angles = l.inverse_kinematics(target)?;
        l.validate_angles(angles)?;
        let targets = l.servo_targets(angles);

        debug!("Moving leg {} to {} ({:?})", leg, target, angles);
        for (channel, value) in targets {
            self.bus.set_target(channel, value)?;
        }
        self.current_positions[leg] = target;
        self.current_angles[leg] = angles;
        Ok(())
    }

    fn move_all_legs(&mut self, targets: &[Vector3D; LEG_COUNT]) -> Result<()> {
        let mut angles = [JointAngles::default(); LEG_COUNT];
        for (i, leg) in self.legs.iter().enumerate() {
            angles[i] = leg.inverse_kinematics(targets[i])?;
        }
        self.move_all_legs_angles(&angles)?;
        self.current_positions = *targets;
        Ok(())
    }

    fn move_all_legs_angles(&mut self, angles: &[JointAngles; LEG_COUNT]) -> Result<()> {
        for (leg, &a) in self.legs.iter().zip(angles) {
            leg.validate_angles(a)?;
        }

        // One packet for the whole board; channels without a servo stay off
        let mut block: Vec<(u8, u16)> = (0..CONTROLLER_CHANNELS as u8).map(|ch| (ch, 0)).collect();
        for (leg, &a) in self.legs.iter().zip(angles) {
            for (channel, value) in leg.servo_targets(a) {
                block[channel as usize].1 = value;
            }
        }
        debug!("Moving all legs: {:?}", angles);
        self.bus.set_multiple_targets(&block)?;

        self.current_angles = *angles;
        self.sync_positions_from_angles();
        Ok(())
    }

    fn is_moving(&mut self) -> Result<bool> {
        Ok(self.bus.get_moving_state()?)
    }

    fn motion_start_grace(&self) -> Duration {
        self.motion_start_grace
    }
}

impl<B: ServoBus> Drop for Hexapod<B> {
    fn drop(&mut self) {
        // Leave the servos unpowered rather than holding a half-finished pose
        let targets: Vec<(u8, u16)> = (0..CONTROLLER_CHANNELS as u8).map(|ch| (ch, 0)).collect();
        if let Err(e) = self.bus.set_multiple_targets(&targets) {
            warn!("Failed to release servos on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::maestro::MaestroError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum BusCall {
        Target(u8, u16),
        Multiple(Vec<(u8, u16)>),
        Speed(u8, u16),
        Accel(u8, u16),
    }

    /// Records every bus call for inspection
    #[derive(Clone, Default)]
    struct RecordingBus {
        calls: Arc<Mutex<Vec<BusCall>>>,
    }

    impl ServoBus for RecordingBus {
        fn set_target(&mut self, channel: u8, target: u16) -> std::result::Result<(), MaestroError> {
            self.calls.lock().unwrap().push(BusCall::Target(channel, target));
            Ok(())
        }

        fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> std::result::Result<(), MaestroError> {
            self.calls.lock().unwrap().push(BusCall::Multiple(targets.to_vec()));
            Ok(())
        }

        fn set_speed(&mut self, channel: u8, speed: u16) -> std::result::Result<(), MaestroError> {
            self.calls.lock().unwrap().push(BusCall::Speed(channel, speed));
            Ok(())
        }

        fn set_acceleration(&mut self, channel: u8, accel: u16) -> std::result::Result<(), MaestroError> {
            self.calls.lock().unwrap().push(BusCall::Accel(channel, accel));
            Ok(())
        }

        fn get_moving_state(&mut self) -> std::result::Result<bool, MaestroError> {
            Ok(false)
        }
    }

    fn hexapod() -> (Hexapod<RecordingBus>, Arc<Mutex<Vec<BusCall>>>) {
        let bus = RecordingBus::default();
        let calls = bus.calls.clone();
        (Hexapod::new(bus, &HexapodConfig::default()), calls)
    }

    #[test]
    fn test_percent_to_maestro() {
        assert_eq!(percent_to_maestro(0), 0);
        assert_eq!(percent_to_maestro(1), 1);
        assert_eq!(percent_to_maestro(100), 255);
        assert_eq!(percent_to_maestro(150), 255);
    }

    #[test]
    fn test_move_leg_sends_three_targets() {
        let (mut hexapod, calls) = hexapod();
        hexapod.move_leg(1, Vector3D::ZERO).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                BusCall::Target(3, 5984),
                BusCall::Target(4, 5984),
                BusCall::Target(5, 5984),
            ]
        );
        assert_eq!(hexapod.current_leg_positions()[1], Vector3D::ZERO);
    }

    #[test]
    fn test_rejected_move_leaves_cache_untouched() {
        let (mut hexapod, calls) = hexapod();
        let before = hexapod.current_leg_positions();
        let err = hexapod
            .move_leg(0, Vector3D::new(0.0, 300.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LegError::OutOfReach { .. }));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(hexapod.current_leg_positions(), before);

        assert!(matches!(
            hexapod.move_leg(6, Vector3D::ZERO),
            Err(LegError::InvalidLeg(6))
        ));
    }

    #[test]
    fn test_move_all_legs_single_packet() {
        let (mut hexapod, calls) = hexapod();
        hexapod.move_all_legs(&[Vector3D::ZERO; LEG_COUNT]).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let BusCall::Multiple(block) = &calls[0] else {
            panic!("expected a multiple-targets packet");
        };
        assert_eq!(block.len(), CONTROLLER_CHANNELS);
        assert!(block[..18].iter().all(|&(_, v)| v == 5984));
        assert!(block[18..].iter().all(|&(_, v)| v == 0));
        assert_eq!(hexapod.current_leg_positions(), [Vector3D::ZERO; LEG_COUNT]);
    }

    #[test]
    fn test_move_all_legs_validates_before_sending() {
        let (mut hexapod, calls) = hexapod();
        let mut angles = [JointAngles::default(); LEG_COUNT];
        angles[4].tibia = 120.0;
        assert!(hexapod.move_all_legs_angles(&angles).is_err());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_speed_applies_to_leg_channels() {
        let (mut hexapod, calls) = hexapod();
        hexapod.set_all_servos_speed(100).unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 18);
        assert!(calls.iter().all(|c| matches!(c, BusCall::Speed(_, 255))));
    }

    #[test]
    fn test_drop_releases_servos() {
        let (hexapod, calls) = hexapod();
        drop(hexapod);
        let calls = calls.lock().unwrap();
        assert!(matches!(calls.last(), Some(BusCall::Multiple(block)) if block.iter().all(|&(_, v)| v == 0)));
    }
}
