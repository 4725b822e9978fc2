// Per-phase execution: issue waypoints, wait at the motion barrier
//
// Waypoint k of every leg is issued before any leg gets waypoint k+1, and
// the executor waits for all legs to stop between waypoint indices. A
// rejected waypoint is logged and skipped; the other legs carry on.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::phase::GaitPhase;
use super::signal::StopSignal;
use super::trajectory::LegPath;
use super::{GaitError, Result};
use crate::geometry::Vector3D;
use crate::robot::controller::LegController;

/// Sleep between "any leg moving" polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a motion-complete wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Complete,
    TimedOut,
    Cancelled,
}

/// Wait until the controller reports no motion.
///
/// The controller's start grace is spent waiting for motion to be reported at
/// all; if it never is, the move is taken as already finished. The whole wait
/// is bounded by `timeout` and returns early once `stop` is set.
pub fn wait_until_motion_complete<C: LegController>(
    controller: &Mutex<C>,
    stop: &StopSignal,
    timeout: Duration,
) -> Result<WaitOutcome> {
    let start = Instant::now();
    let grace = controller
        .lock()
        .map_err(|_| GaitError::LockPoisoned)?
        .motion_start_grace();
    let mut seen_moving = grace.is_zero();

    loop {
        if stop.is_set() {
            return Ok(WaitOutcome::Cancelled);
        }

        let moving = {
            let mut c = controller.lock().map_err(|_| GaitError::LockPoisoned)?;
            match c.is_moving() {
                Ok(moving) => moving,
                Err(e) => {
                    warn!("Failed to read moving state, assuming idle: {}", e);
                    false
                }
            }
        };

        if moving {
            seen_moving = true;
        } else if seen_moving || start.elapsed() >= grace {
            return Ok(WaitOutcome::Complete);
        }

        if start.elapsed() >= timeout {
            warn!("Motion still in progress after {:?}, moving on", timeout);
            return Ok(WaitOutcome::TimedOut);
        }
        if stop.wait_timeout(POLL_INTERVAL) {
            return Ok(WaitOutcome::Cancelled);
        }
    }
}

/// What happened while executing one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: GaitPhase,
    /// Waypoints accepted by the controller
    pub issued: usize,
    /// Waypoints the controller rejected
    pub failed: usize,
    /// Waypoint index where a stop request cut the phase short
    pub interrupted_at: Option<usize>,
    /// Motion waits that hit the timeout
    pub timeouts: usize,
}

impl PhaseReport {
    fn new(phase: GaitPhase) -> Self {
        Self {
            phase,
            issued: 0,
            failed: 0,
            interrupted_at: None,
            timeouts: 0,
        }
    }
}

/// Drives the legs of one phase through their paths
pub struct PhaseExecutor<'a, C: LegController> {
    controller: &'a Mutex<C>,
    stop: &'a StopSignal,
    motion_timeout: Duration,
}

impl<'a, C: LegController> PhaseExecutor<'a, C> {
    pub fn new(controller: &'a Mutex<C>, stop: &'a StopSignal, motion_timeout: Duration) -> Self {
        Self {
            controller,
            stop,
            motion_timeout,
        }
    }

    /// Execute `paths` (leg index, path). Returns once every leg has finished,
    /// or after the final waypoints were issued in response to a stop request.
    pub fn execute(&self, phase: GaitPhase, paths: &[(usize, LegPath)]) -> Result<PhaseReport> {
        let mut report = PhaseReport::new(phase);
        let depth = paths.iter().map(|(_, p)| p.pending().len()).max().unwrap_or(0);
        debug!("Executing {:?}: {} legs, {} waypoints", phase, paths.len(), depth);

        for k in 0..depth {
            for (leg, path) in paths {
                if let Some(&waypoint) = path.pending().get(k) {
                    self.issue(*leg, waypoint, &mut report)?;
                }
            }

            match wait_until_motion_complete(self.controller, self.stop, self.motion_timeout)? {
                WaitOutcome::Complete => {}
                WaitOutcome::TimedOut => report.timeouts += 1,
                WaitOutcome::Cancelled => {
                    debug!("Stop requested at waypoint {} of {:?}", k, phase);
                    report.interrupted_at = Some(k);
                    self.finish_paths(paths, k, &mut report)?;
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Send every leg straight to its final waypoint so none is left mid-path
    fn finish_paths(&self, paths: &[(usize, LegPath)], done: usize, report: &mut PhaseReport) -> Result<()> {
        for (leg, path) in paths {
            let pending = path.pending();
            if pending.len() > done + 1 {
                if let Some(&last) = pending.last() {
                    self.issue(*leg, last, report)?;
                }
            }
        }
        Ok(())
    }

    fn issue(&self, leg: usize, waypoint: Vector3D, report: &mut PhaseReport) -> Result<()> {
        let mut c = self.controller.lock().map_err(|_| GaitError::LockPoisoned)?;
        match c.move_leg(leg, waypoint) {
            Ok(()) => report.issued += 1,
            Err(e) => {
                warn!("Skipping waypoint {} for leg {}: {}", waypoint, leg, e);
                report.failed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::sim::SimulatedHexapod;

    fn path(points: &[(f64, f64, f64)]) -> LegPath {
        LegPath::new(points.iter().map(|&p| Vector3D::from(p)).collect())
    }

    #[test]
    fn test_waypoints_issued_in_lockstep() {
        let sim = Mutex::new(SimulatedHexapod::default());
        let stop = StopSignal::new();
        let paths = vec![
            (0, path(&[(0.0, 0.0, 0.0), (0.0, 5.0, 5.0), (0.0, 10.0, 0.0)])),
            (3, path(&[(0.0, 0.0, 0.0), (0.0, -10.0, 0.0)])),
        ];
        let report = PhaseExecutor::new(&sim, &stop, Duration::from_secs(1))
            .execute(GaitPhase::TripodA, &paths)
            .unwrap();

        assert_eq!(report.issued, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.interrupted_at, None);
        let sim = sim.into_inner().unwrap();
        let legs: Vec<usize> = sim.command_log().iter().map(|c| c.leg).collect();
        assert_eq!(legs, vec![0, 3, 0]);
    }

    #[test]
    fn test_rejected_leg_is_skipped() {
        let sim = Mutex::new(SimulatedHexapod::default().reject_leg(2));
        let stop = StopSignal::new();
        let paths = vec![
            (1, path(&[(0.0, 0.0, 0.0), (0.0, 5.0, 0.0)])),
            (2, path(&[(0.0, 0.0, 0.0), (0.0, 5.0, 0.0)])),
        ];
        let report = PhaseExecutor::new(&sim, &stop, Duration::from_secs(1))
            .execute(GaitPhase::TripodB, &paths)
            .unwrap();
        assert_eq!(report.issued, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_wait_bounded_when_stuck() {
        let sim = Mutex::new(SimulatedHexapod::default().stuck_moving());
        let stop = StopSignal::new();
        let start = Instant::now();
        let outcome = wait_until_motion_complete(&sim, &stop, Duration::from_millis(60)).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_polls_until_idle() {
        let sim = SimulatedHexapod::default().with_motion_polls(3);
        let sim = Mutex::new(sim);
        sim.lock().unwrap().move_leg(0, Vector3D::ZERO).unwrap();
        let outcome =
            wait_until_motion_complete(&sim, &StopSignal::new(), Duration::from_secs(1)).unwrap();
        assert_eq!(outcome, WaitOutcome::Complete);
        assert_eq!(sim.lock().unwrap().moving_queries(), 4);
    }

    #[test]
    fn test_grace_expires_without_motion() {
        let grace = Duration::from_millis(60);
        let sim = Mutex::new(SimulatedHexapod::default().with_start_grace(grace));
        sim.lock().unwrap().move_leg(0, Vector3D::ZERO).unwrap();
        let start = Instant::now();
        let outcome =
            wait_until_motion_complete(&sim, &StopSignal::new(), Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, WaitOutcome::Complete);
        // Kept polling for the whole grace, then took the move as done
        assert!(start.elapsed() >= grace);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(sim.lock().unwrap().moving_queries() >= 2);
    }

    #[test]
    fn test_late_motion_is_waited_for() {
        let sim = SimulatedHexapod::default()
            .with_start_grace(Duration::from_secs(1))
            .with_late_motion(2)
            .with_motion_polls(2);
        let sim = Mutex::new(sim);
        sim.lock().unwrap().move_leg(0, Vector3D::ZERO).unwrap();
        let start = Instant::now();
        let outcome =
            wait_until_motion_complete(&sim, &StopSignal::new(), Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, WaitOutcome::Complete);
        // Two idle polls, two moving polls, then idle after motion was seen
        assert_eq!(sim.lock().unwrap().moving_queries(), 5);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stop_finishes_paths_and_records_position() {
        let sim = Mutex::new(SimulatedHexapod::default().stuck_moving());
        let stop = StopSignal::new();
        stop.set();
        let paths = vec![(
            4,
            path(&[
                (0.0, 0.0, 0.0),
                (0.0, 3.0, 8.0),
                (0.0, 6.0, 8.0),
                (0.0, 9.0, 0.0),
            ]),
        )];
        let report = PhaseExecutor::new(&sim, &stop, Duration::from_secs(5))
            .execute(GaitPhase::Wave5, &paths)
            .unwrap();

        assert_eq!(report.interrupted_at, Some(0));
        let sim = sim.into_inner().unwrap();
        // First waypoint, then straight to the end of the path
        assert_eq!(
            sim.commands_for(4),
            vec![Vector3D::new(0.0, 3.0, 8.0), Vector3D::new(0.0, 9.0, 0.0)]
        );
    }
}
