// In-memory hexapod for dry runs and tests
//
// Runs the same kinematics and limit checks as the hardware driver but only
// records what it would have sent.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::controller::{JointAngles, LEG_COUNT, LegController, LegError, LegGeometry, Result};
use super::leg::Leg;
use crate::config::HexapodConfig;
use crate::geometry::Vector3D;

/// Default number of commands kept in the log; older ones are dropped
pub const LOG_CAPACITY: usize = 4096;

/// One accepted leg command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegCommand {
    pub leg: usize,
    pub target: Vector3D,
}

/// Simulated hexapod implementing [`LegController`]
pub struct SimulatedHexapod {
    legs: [Leg; LEG_COUNT],
    geometry: LegGeometry,
    positions: [Vector3D; LEG_COUNT],
    angles: [JointAngles; LEG_COUNT],
    log: VecDeque<LegCommand>,
    log_capacity: usize,
    /// Polls that report "moving" after each command
    motion_polls: u32,
    pending_polls: u32,
    /// Polls that still report idle after each command, before the motion shows
    idle_polls: u32,
    pending_idle_polls: u32,
    start_grace: Duration,
    stuck_moving: bool,
    rejected_legs: [bool; LEG_COUNT],
    moving_queries: u64,
}

impl SimulatedHexapod {
    /// Start with every foot at its neutral point
    pub fn new(config: &HexapodConfig) -> Self {
        Self {
            legs: config.legs(),
            geometry: config.geometry(),
            positions: [Vector3D::ZERO; LEG_COUNT],
            angles: [JointAngles::default(); LEG_COUNT],
            log: VecDeque::new(),
            log_capacity: LOG_CAPACITY,
            motion_polls: 0,
            pending_polls: 0,
            idle_polls: 0,
            pending_idle_polls: 0,
            start_grace: Duration::ZERO,
            stuck_moving: false,
            rejected_legs: [false; LEG_COUNT],
            moving_queries: 0,
        }
    }

    /// Report motion for `polls` queries after every command
    pub fn with_motion_polls(mut self, polls: u32) -> Self {
        self.motion_polls = polls;
        self
    }

    /// Report idle for `polls` queries after every command before the motion
    /// polls start, like a controller that reports motion late
    pub fn with_late_motion(mut self, polls: u32) -> Self {
        self.idle_polls = polls;
        self
    }

    /// Start grace returned through [`LegController::motion_start_grace`]
    pub fn with_start_grace(mut self, grace: Duration) -> Self {
        self.start_grace = grace;
        self
    }

    /// Keep at most `capacity` commands in the log
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self.log.truncate(capacity);
        self
    }

    /// Never report motion as complete
    pub fn stuck_moving(mut self) -> Self {
        self.stuck_moving = true;
        self
    }

    /// Fail every move of `leg` with an out-of-range error
    pub fn reject_leg(mut self, leg: usize) -> Self {
        if let Some(flag) = self.rejected_legs.get_mut(leg) {
            *flag = true;
        }
        self
    }

    /// The most recent accepted leg commands, oldest first
    pub fn command_log(&self) -> Vec<LegCommand> {
        self.log.iter().copied().collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Accepted commands for one leg
    pub fn commands_for(&self, leg: usize) -> Vec<Vector3D> {
        self.log
            .iter()
            .filter(|c| c.leg == leg)
            .map(|c| c.target)
            .collect()
    }

    /// Number of `is_moving` queries answered so far
    pub fn moving_queries(&self) -> u64 {
        self.moving_queries
    }

    pub fn current_leg_angles(&self) -> [JointAngles; LEG_COUNT] {
        self.angles
    }

    fn record(&mut self, leg: usize, target: Vector3D) {
        if self.log_capacity == 0 {
            return;
        }
        while self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(LegCommand { leg, target });
    }

    fn start_motion(&mut self) {
        self.pending_idle_polls = self.idle_polls;
        self.pending_polls = self.motion_polls;
    }

    fn solve(&self, leg: usize, target: Vector3D) -> Result<JointAngles> {
        let l = self.legs.get(leg).ok_or(LegError::InvalidLeg(leg))?;
        let angles = l.inverse_kinematics(target)?;
        l.validate_angles(angles)?;
        if self.rejected_legs[leg] {
            return Err(LegError::AngleOutOfRange {
                leg,
                joint: l.coxa.kind,
                angle: angles.coxa,
                min: 0.0,
                max: 0.0,
            });
        }
        Ok(angles)
    }
}

impl Default for SimulatedHexapod {
    fn default() -> Self {
        Self::new(&HexapodConfig::default())
    }
}

impl LegController for SimulatedHexapod {
    fn geometry(&self) -> &LegGeometry {
        &self.geometry
    }

    fn current_leg_positions(&self) -> [Vector3D; LEG_COUNT] {
        self.positions
    }

    fn move_leg(&mut self, leg: usize, target: Vector3D) -> Result<()> {
        let angles = self.solve(leg, target)?;
        debug!("[sim] leg {} -> {}", leg, target);
        self.positions[leg] = target;
        self.angles[leg] = angles;
        self.record(leg, target);
        self.start_motion();
        Ok(())
    }

    fn move_all_legs(&mut self, targets: &[Vector3D; LEG_COUNT]) -> Result<()> {
        let mut angles = [JointAngles::default(); LEG_COUNT];
        for (leg, &target) in targets.iter().enumerate() {
            angles[leg] = self.solve(leg, target)?;
        }
        for (leg, &target) in targets.iter().enumerate() {
            self.record(leg, target);
        }
        self.positions = *targets;
        self.angles = angles;
        self.start_motion();
        Ok(())
    }

    fn move_all_legs_angles(&mut self, angles: &[JointAngles; LEG_COUNT]) -> Result<()> {
        for (leg, &a) in self.legs.iter().zip(angles) {
            leg.validate_angles(a)?;
        }
        for (i, leg) in self.legs.iter().enumerate() {
            self.positions[i] = leg.forward_kinematics(angles[i]);
        }
        for i in 0..LEG_COUNT {
            self.record(i, self.positions[i]);
        }
        self.angles = *angles;
        self.start_motion();
        Ok(())
    }

    fn is_moving(&mut self) -> Result<bool> {
        self.moving_queries += 1;
        if self.stuck_moving {
            return Ok(true);
        }
        if self.pending_idle_polls > 0 {
            self.pending_idle_polls -= 1;
            return Ok(false);
        }
        if self.pending_polls > 0 {
            self.pending_polls -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn motion_start_grace(&self) -> Duration {
        self.start_grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_accepted_moves() {
        let mut sim = SimulatedHexapod::default();
        sim.move_leg(2, Vector3D::new(0.0, 10.0, 5.0)).unwrap();
        assert_eq!(
            sim.command_log(),
            &[LegCommand {
                leg: 2,
                target: Vector3D::new(0.0, 10.0, 5.0)
            }]
        );
        assert_eq!(sim.current_leg_positions()[2], Vector3D::new(0.0, 10.0, 5.0));
    }

    #[test]
    fn test_unreachable_move_not_recorded() {
        let mut sim = SimulatedHexapod::default();
        assert!(sim.move_leg(0, Vector3D::new(0.0, 200.0, 0.0)).is_err());
        assert!(sim.command_log().is_empty());
        assert_eq!(sim.current_leg_positions()[0], Vector3D::ZERO);
    }

    #[test]
    fn test_motion_polls_count_down() {
        let mut sim = SimulatedHexapod::default().with_motion_polls(2);
        sim.move_leg(0, Vector3D::ZERO).unwrap();
        assert!(sim.is_moving().unwrap());
        assert!(sim.is_moving().unwrap());
        assert!(!sim.is_moving().unwrap());
        assert_eq!(sim.moving_queries(), 3);
    }

    #[test]
    fn test_log_keeps_only_recent_commands() {
        let mut sim = SimulatedHexapod::default().with_log_capacity(4);
        for i in 0..10 {
            sim.move_leg(i % LEG_COUNT, Vector3D::new(0.0, i as f64, 0.0)).unwrap();
        }
        let log = sim.command_log();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].target, Vector3D::new(0.0, 6.0, 0.0));
        assert_eq!(log[3].target, Vector3D::new(0.0, 9.0, 0.0));
    }

    #[test]
    fn test_default_log_is_bounded() {
        let mut sim = SimulatedHexapod::default();
        for _ in 0..(LOG_CAPACITY / LEG_COUNT + 10) {
            sim.move_all_legs(&[Vector3D::ZERO; LEG_COUNT]).unwrap();
        }
        assert_eq!(sim.command_log().len(), LOG_CAPACITY);
    }

    #[test]
    fn test_late_motion_reports_idle_first() {
        let mut sim = SimulatedHexapod::default()
            .with_late_motion(1)
            .with_motion_polls(1)
            .with_start_grace(Duration::from_millis(50));
        sim.move_leg(0, Vector3D::ZERO).unwrap();
        assert!(!sim.is_moving().unwrap());
        assert!(sim.is_moving().unwrap());
        assert!(!sim.is_moving().unwrap());
        assert_eq!(sim.motion_start_grace(), Duration::from_millis(50));
    }

    #[test]
    fn test_rejected_leg_fails() {
        let mut sim = SimulatedHexapod::default().reject_leg(3);
        assert!(matches!(
            sim.move_leg(3, Vector3D::ZERO),
            Err(LegError::AngleOutOfRange { leg: 3, .. })
        ));
        assert!(sim.move_leg(2, Vector3D::ZERO).is_ok());
    }

    #[test]
    fn test_move_all_legs_angles_updates_positions() {
        let mut sim = SimulatedHexapod::default();
        sim.move_all_legs_angles(&[JointAngles::default(); LEG_COUNT])
            .unwrap();
        assert_eq!(sim.current_leg_positions(), [Vector3D::ZERO; LEG_COUNT]);
        assert_eq!(sim.command_log().len(), LEG_COUNT);
    }
}
