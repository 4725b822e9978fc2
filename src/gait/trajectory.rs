// Swing and stance trajectories between two foot positions

use std::f64::consts::PI;

use super::config::GaitConfig;
use crate::geometry::Vector3D;

/// Ordered waypoints for one leg during one phase
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegPath {
    pub waypoints: Vec<Vector3D>,
}

impl LegPath {
    pub fn new(waypoints: Vec<Vector3D>) -> Self {
        Self { waypoints }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn first(&self) -> Option<Vector3D> {
        self.waypoints.first().copied()
    }

    pub fn last(&self) -> Option<Vector3D> {
        self.waypoints.last().copied()
    }

    /// Waypoints that still have to be commanded. The first waypoint of a
    /// multi-point path is the position the leg is already at.
    pub fn pending(&self) -> &[Vector3D] {
        if self.waypoints.len() > 1 {
            &self.waypoints[1..]
        } else {
            &self.waypoints
        }
    }
}

/// Builds leg paths from the gait's lift and step settings
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryPlanner {
    steps: usize,
    lift: f64,
    incline: f64,
}

impl TrajectoryPlanner {
    pub fn new(config: &GaitConfig) -> Self {
        Self {
            steps: config.transition_steps,
            lift: config.leg_lift_distance,
            incline: config.leg_lift_incline,
        }
    }

    /// Lifted arc. X/Y move linearly; Z rises on a sin² bump to
    /// `lift + incline * horizontal distance` above the higher end point.
    pub fn swing(&self, start: Vector3D, end: Vector3D) -> LegPath {
        if self.steps <= 1 {
            return LegPath::new(vec![end]);
        }

        let peak = start.z.max(end.z) + self.lift + self.incline * start.planar_distance(end);
        let last = self.steps - 1;
        let waypoints = (0..self.steps)
            .map(|i| {
                if i == 0 {
                    return start;
                }
                if i == last {
                    return end;
                }
                let t = i as f64 / last as f64;
                let base = start.lerp(end, t);
                let bump = (PI * t).sin().powi(2);
                base.with_z(base.z + (peak - base.z) * bump)
            })
            .collect();
        LegPath::new(waypoints)
    }

    /// Ground-plane push: X/Y move linearly at the end point's height
    pub fn stance(&self, start: Vector3D, end: Vector3D) -> LegPath {
        if self.steps <= 1 {
            return LegPath::new(vec![end]);
        }

        let last = self.steps - 1;
        let waypoints = (0..self.steps)
            .map(|i| {
                if i == 0 {
                    return start;
                }
                if i == last {
                    return end;
                }
                let t = i as f64 / last as f64;
                start.lerp(end, t).with_z(end.z)
            })
            .collect();
        LegPath::new(waypoints)
    }

    pub fn plan(&self, start: Vector3D, end: Vector3D, is_swing: bool) -> LegPath {
        if is_swing {
            self.swing(start, end)
        } else {
            self.stance(start, end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(steps: usize) -> TrajectoryPlanner {
        TrajectoryPlanner::new(&GaitConfig {
            transition_steps: steps,
            leg_lift_distance: 20.0,
            leg_lift_incline: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_single_step_jumps_to_end() {
        let start = Vector3D::new(1.0, 2.0, 3.0);
        let end = Vector3D::new(4.0, 5.0, 6.0);
        for steps in [0, 1] {
            assert_eq!(planner(steps).swing(start, end).waypoints, vec![end]);
            assert_eq!(planner(steps).stance(start, end).waypoints, vec![end]);
        }
        assert_eq!(planner(1).swing(start, end).pending(), &[end]);
    }

    #[test]
    fn test_endpoints_exact() {
        let start = Vector3D::new(-30.0, 0.0, 0.0);
        let end = Vector3D::new(30.0, 0.0, -5.0);
        for steps in 2..10 {
            for path in [planner(steps).swing(start, end), planner(steps).stance(start, end)] {
                assert_eq!(path.len(), steps);
                assert_eq!(path.first(), Some(start));
                assert_eq!(path.last(), Some(end));
            }
        }
    }

    #[test]
    fn test_swing_lifts_to_peak_and_never_dips() {
        let start = Vector3D::new(-30.0, 0.0, 0.0);
        let end = Vector3D::new(30.0, 0.0, 0.0);
        let path = planner(5).swing(start, end);
        // Midpoint sits at the peak
        assert!((path.waypoints[2].z - 20.0).abs() < 1e-9);
        assert!((path.waypoints[2].x).abs() < 1e-9);
        assert!(path.waypoints.iter().all(|w| w.z >= 0.0));
    }

    #[test]
    fn test_incline_raises_peak() {
        let planner = TrajectoryPlanner::new(&GaitConfig {
            transition_steps: 3,
            leg_lift_distance: 10.0,
            leg_lift_incline: 0.5,
            ..Default::default()
        });
        let path = planner.swing(Vector3D::ZERO, Vector3D::new(0.0, 20.0, 0.0));
        assert!((path.waypoints[1].z - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_stance_stays_on_ground() {
        let start = Vector3D::new(0.0, 30.0, 4.0);
        let end = Vector3D::new(0.0, 0.0, -10.0);
        let path = planner(6).stance(start, end);
        for w in &path.waypoints[1..] {
            assert_eq!(w.z, -10.0);
        }
        assert!(path.waypoints.windows(2).all(|p| p[1].y <= p[0].y));
    }

    #[test]
    fn test_pending_skips_current_position() {
        let path = planner(4).stance(Vector3D::ZERO, Vector3D::new(0.0, 9.0, 0.0));
        assert_eq!(path.pending().len(), 3);
        assert_eq!(path.pending()[2], Vector3D::new(0.0, 9.0, 0.0));
    }
}
