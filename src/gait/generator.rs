// Gait generator: owns the gait worker thread
//
// The worker walks the phase machine. For every phase it snapshots the
// direction input, plans one path per leg, executes them and then holds the
// phase for the dwell time. Stop requests, cycle limits and duration limits
// are checked at phase boundaries only.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::GaitConfig;
use super::executor::{PhaseExecutor, PhaseReport};
use super::input::{DirectionInput, SharedInput, named_direction};
use super::phase::{GaitKind, GaitPhase, GaitState, PhaseMachine};
use super::signal::StopSignal;
use super::target::TargetCalculator;
use super::trajectory::{LegPath, TrajectoryPlanner};
use super::{GaitError, Result};
use crate::geometry::{Vector2D, Vector3D};
use crate::imu::{Imu, StabilityMonitor};
use crate::robot::controller::{LEG_COUNT, LegController};

type SharedImu = Arc<Mutex<Box<dyn Imu>>>;

/// A validated gait, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct Gait {
    pub kind: GaitKind,
    pub config: GaitConfig,
}

/// Counters of the current (or last) run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GaitStats {
    pub gait: Option<GaitKind>,
    pub cycles: u64,
    pub phases: u64,
    pub waypoints: u64,
    pub failed_waypoints: u64,
    pub motion_timeouts: u64,
    pub stability_warnings: u64,
    pub last_phase: Option<GaitPhase>,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RunLimit {
    Unbounded,
    Cycles(u64),
    Duration(Duration),
}

impl RunLimit {
    fn reached(&self, cycles: u64, started: Instant) -> bool {
        match *self {
            RunLimit::Unbounded => false,
            RunLimit::Cycles(n) => cycles >= n,
            RunLimit::Duration(d) => started.elapsed() >= d,
        }
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        match *self {
            RunLimit::Duration(d) => Some(d.saturating_sub(started.elapsed())),
            _ => None,
        }
    }
}

/// Plan one path per leg for a phase, starting from the current positions
fn plan_phase(
    targets: &TargetCalculator,
    planner: &TrajectoryPlanner,
    state: &GaitState,
    input: &DirectionInput,
    current: &[Vector3D; LEG_COUNT],
) -> Vec<(usize, LegPath)> {
    let mut paths = Vec::with_capacity(LEG_COUNT);
    for leg in state.swing_legs.iter() {
        let target = targets.swing_target(leg, input);
        paths.push((leg, planner.swing(current[leg], target)));
    }
    for leg in state.stance_legs.iter() {
        let target = targets.stance_target(leg, input, current[leg]);
        paths.push((leg, planner.stance(current[leg], target)));
    }
    paths
}

/// Swing every leg that is off `neutral` back to it, one phase group at a
/// time in the gait's phase order. Stops early if a phase is interrupted.
fn return_legs_to_neutral<C: LegController>(
    controller: &Mutex<C>,
    executor: &PhaseExecutor<C>,
    planner: &TrajectoryPlanner,
    kind: GaitKind,
    neutral: Vector3D,
) -> Result<Vec<PhaseReport>> {
    let mut reports = Vec::new();
    for &phase in kind.phases() {
        let current = controller
            .lock()
            .map_err(|_| GaitError::LockPoisoned)?
            .current_leg_positions();
        let paths: Vec<(usize, LegPath)> = phase
            .swing_legs()
            .iter()
            .filter(|&leg| current[leg] != neutral)
            .map(|leg| (leg, planner.swing(current[leg], neutral)))
            .collect();
        if paths.is_empty() {
            continue;
        }
        let report = executor.execute(phase, &paths)?;
        let interrupted = report.interrupted_at.is_some();
        reports.push(report);
        if interrupted {
            break;
        }
    }
    Ok(reports)
}

/// Everything the gait thread needs, moved into it at spawn
struct Worker<C: LegController> {
    controller: Arc<Mutex<C>>,
    imu: Option<SharedImu>,
    input: SharedInput,
    stop: StopSignal,
    stats: Arc<Mutex<GaitStats>>,
    gait: Gait,
    limit: RunLimit,
}

impl<C: LegController> Worker<C> {
    fn run(self) -> Result<u64> {
        let config = &self.gait.config;
        let geometry = self
            .controller
            .lock()
            .map_err(|_| GaitError::LockPoisoned)?
            .geometry()
            .clone();
        let targets = TargetCalculator::new(config, &geometry);
        let planner = TrajectoryPlanner::new(config);
        let monitor = StabilityMonitor::new(config.stability_threshold);
        let executor = PhaseExecutor::new(&self.controller, &self.stop, config.motion_timeout());
        let mut machine = PhaseMachine::new(self.gait.kind, config.dwell());

        info!("{} gait started ({:?})", self.gait.kind, self.limit);
        let started = Instant::now();
        let mut cycles = 0u64;

        while !self.stop.is_set() && !self.limit.reached(cycles, started) {
            let queued = if machine.current() == self.gait.kind.initial_phase() {
                self.input.take_queued()?
            } else {
                None
            };
            if let Some(next) = queued {
                info!("Cycle boundary: returning to neutral before {:?}", next);
                let reports = return_legs_to_neutral(
                    &self.controller,
                    &executor,
                    &planner,
                    self.gait.kind,
                    targets.neutral(),
                )?;
                self.record_transition(&reports)?;
                if reports.iter().any(|r| r.interrupted_at.is_some()) {
                    break;
                }
                self.input.apply_queued(next)?;
            }

            let phase_started = Instant::now();
            let state = machine.state();
            let input = self.input.snapshot()?;
            let current = self
                .controller
                .lock()
                .map_err(|_| GaitError::LockPoisoned)?
                .current_leg_positions();

            debug!(
                "Phase {:?}: swing {:?}, stance {:?}, input {:?}",
                state.phase,
                state.swing_legs.iter().collect::<Vec<_>>(),
                state.stance_legs.iter().collect::<Vec<_>>(),
                input
            );
            let paths = plan_phase(&targets, &planner, &state, &input, &current);
            let report = executor.execute(state.phase, &paths)?;

            let unstable = match &self.imu {
                Some(imu) => match imu.lock() {
                    Ok(mut guard) => monitor.check(&mut **guard).is_some(),
                    Err(_) => {
                        warn!("IMU lock poisoned, skipping stability check");
                        false
                    }
                },
                None => false,
            };

            if machine.advance() {
                cycles += 1;
                info!("Completed {} gait cycle {}", self.gait.kind, cycles);
            }
            self.record(&report, unstable, cycles)?;

            if report.interrupted_at.is_some() || self.limit.reached(cycles, started) {
                break;
            }

            // Dwell is a minimum phase duration, cut short by a duration limit
            let mut dwell = state.dwell_time.saturating_sub(phase_started.elapsed());
            if let Some(remaining) = self.limit.remaining(started) {
                dwell = dwell.min(remaining);
            }
            if self.stop.wait_timeout(dwell) {
                break;
            }
        }

        info!(
            "{} gait stopped after {} cycles in {:.2}s",
            self.gait.kind,
            cycles,
            started.elapsed().as_secs_f64()
        );
        Ok(cycles)
    }

    fn record(&self, report: &PhaseReport, unstable: bool, cycles: u64) -> Result<()> {
        let mut stats = self.stats.lock().map_err(|_| GaitError::LockPoisoned)?;
        stats.phases += 1;
        stats.cycles = cycles;
        stats.waypoints += report.issued as u64;
        stats.failed_waypoints += report.failed as u64;
        stats.motion_timeouts += report.timeouts as u64;
        if unstable {
            stats.stability_warnings += 1;
        }
        stats.last_phase = Some(report.phase);
        Ok(())
    }

    /// Neutral transitions count their waypoints but not as gait phases
    fn record_transition(&self, reports: &[PhaseReport]) -> Result<()> {
        let mut stats = self.stats.lock().map_err(|_| GaitError::LockPoisoned)?;
        for report in reports {
            stats.waypoints += report.issued as u64;
            stats.failed_waypoints += report.failed as u64;
            stats.motion_timeouts += report.timeouts as u64;
        }
        Ok(())
    }
}

/// Runs gaits on a dedicated thread against a shared leg controller
pub struct GaitGenerator<C: LegController + 'static> {
    controller: Arc<Mutex<C>>,
    imu: Option<SharedImu>,
    input: SharedInput,
    stop: StopSignal,
    gait: Option<Gait>,
    worker: Option<JoinHandle<Result<u64>>>,
    stats: Arc<Mutex<GaitStats>>,
}

impl<C: LegController + 'static> GaitGenerator<C> {
    pub fn new(controller: C) -> Self {
        Self::with_shared_controller(Arc::new(Mutex::new(controller)))
    }

    /// Use a controller that other parts of the program also hold
    pub fn with_shared_controller(controller: Arc<Mutex<C>>) -> Self {
        Self {
            controller,
            imu: None,
            input: SharedInput::default(),
            stop: StopSignal::new(),
            gait: None,
            worker: None,
            stats: Arc::new(Mutex::new(GaitStats::default())),
        }
    }

    /// Enable the advisory stability check
    pub fn with_imu(mut self, imu: impl Imu + 'static) -> Self {
        self.imu = Some(Arc::new(Mutex::new(Box::new(imu))));
        self
    }

    /// Share an externally owned stop signal with the gait thread
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn controller(&self) -> Arc<Mutex<C>> {
        self.controller.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn current_gait(&self) -> Option<&Gait> {
        self.gait.as_ref()
    }

    /// Validate `config` and make it the gait the next run uses.
    /// The direction input is reset to zero.
    pub fn create_gait(&mut self, kind: GaitKind, config: GaitConfig) -> Result<&Gait> {
        config.validate()?;
        if self.is_running() {
            return Err(GaitError::AlreadyRunning);
        }
        self.input.set(DirectionInput::default())?;
        info!("Created {} gait: {:?}", kind, config);
        Ok(self.gait.insert(Gait { kind, config }))
    }

    /// Run the current gait until [`stop`](Self::stop) is called.
    /// Fails with `AlreadyRunning` if a run is in progress.
    pub fn start(&mut self) -> Result<()> {
        self.spawn(RunLimit::Unbounded)
    }

    /// Ask the gait thread to stop after the current phase and wait for it.
    /// Does nothing if no run is active.
    pub fn stop(&mut self) -> Result<GaitStats> {
        self.stop.set();
        if self.worker.is_some() {
            self.join()?;
        }
        Ok(self.stats())
    }

    /// Takes effect at the start of the next phase
    pub fn set_direction(&self, direction: impl Into<Vector2D>, rotation: f64) -> Result<()> {
        let input = DirectionInput::new(direction, rotation);
        debug!("Direction set to {:?}", input);
        self.input.set(input)
    }

    /// Change direction at the next cycle boundary, after the legs have been
    /// brought back to neutral. A later `set_direction` cancels it.
    pub fn queue_direction(&self, direction: impl Into<Vector2D>, rotation: f64) -> Result<()> {
        let input = DirectionInput::new(direction, rotation);
        debug!("Direction queued: {:?}", input);
        self.input.queue(input)
    }

    /// `set_direction` with a direction name such as "forward left"
    pub fn set_named_direction(&self, name: &str, rotation: f64) -> Result<()> {
        self.set_direction(named_direction(name)?, rotation)
    }

    pub fn direction(&self) -> Result<DirectionInput> {
        self.input.snapshot()
    }

    /// Walk for `duration`, blocking. The phase in progress when the time is
    /// up is completed, so the run can overshoot by one phase.
    pub fn run_for_duration(&mut self, duration: Duration) -> Result<(u64, Duration)> {
        let started = Instant::now();
        self.spawn(RunLimit::Duration(duration))?;
        let cycles = self.join()?;
        Ok((cycles, started.elapsed()))
    }

    /// Run exactly `cycles` full phase cycles, blocking
    pub fn execute_cycles(&mut self, cycles: u64) -> Result<u64> {
        if self.is_running() {
            return Err(GaitError::AlreadyRunning);
        }
        if self.gait.is_none() {
            return Err(GaitError::NoGait);
        }
        if cycles == 0 {
            return Ok(0);
        }
        self.spawn(RunLimit::Cycles(cycles))?;
        self.join()
    }

    /// Cycles needed to turn the body by `angle_deg` at the given rotation input.
    ///
    /// Open-loop estimate: each cycle turns the body by the stance stroke
    /// divided by the foot radius. Slip is not modelled.
    pub fn cycles_for_rotation(&self, angle_deg: f64, rotation: f64) -> Result<u64> {
        let gait = self.gait.as_ref().ok_or(GaitError::NoGait)?;
        if rotation == 0.0 || !rotation.is_finite() || !angle_deg.is_finite() {
            return Err(GaitError::InvalidConfig(
                "rotation needs a non-zero direction and a finite angle".to_string(),
            ));
        }

        let radius = self
            .controller
            .lock()
            .map_err(|_| GaitError::LockPoisoned)?
            .geometry()
            .end_effector_radius();
        let stroke = gait.config.step_radius * rotation.abs();
        let stroke = if gait.config.use_full_circle_stance {
            2.0 * stroke
        } else {
            stroke
        };
        let per_cycle = (stroke / radius).to_degrees();
        if per_cycle <= 0.0 {
            return Err(GaitError::InvalidConfig(
                "step_radius must be positive to rotate".to_string(),
            ));
        }
        Ok(((angle_deg.abs() / per_cycle).ceil() as u64).max(1))
    }

    /// Turn in place by roughly `angle_deg`. Positive `rotation_direction`
    /// turns clockwise; a negative angle reverses it. Best effort only.
    pub fn execute_rotation_by_angle(&mut self, angle_deg: f64, rotation_direction: f64) -> Result<u64> {
        let cycles = self.cycles_for_rotation(angle_deg, rotation_direction)?;
        let rotation = rotation_direction * angle_deg.signum();
        info!(
            "Rotating {:.1}° ({} cycles at rotation {:.2})",
            angle_deg, cycles, rotation
        );

        let previous = self.input.snapshot()?;
        self.set_direction(Vector2D::ZERO, rotation)?;
        let result = self.execute_cycles(cycles);
        self.input.set(previous)?;
        result
    }

    /// Bring every leg back to the neutral point along swing arcs: tripod
    /// groups for a tripod gait, one leg at a time otherwise. Blocking.
    /// Returns the number of rejected waypoints.
    pub fn return_to_neutral(&mut self) -> Result<usize> {
        if self.is_running() {
            return Err(GaitError::AlreadyRunning);
        }
        let (kind, config) = match &self.gait {
            Some(gait) => (gait.kind, gait.config.clone()),
            None => (GaitKind::Tripod, GaitConfig::default()),
        };
        self.stop.clear();

        let geometry = self
            .controller
            .lock()
            .map_err(|_| GaitError::LockPoisoned)?
            .geometry()
            .clone();
        let neutral = TargetCalculator::new(&config, &geometry).neutral();
        let planner = TrajectoryPlanner::new(&config);
        let executor = PhaseExecutor::new(&self.controller, &self.stop, config.motion_timeout());

        info!("Returning legs to neutral");
        let reports = return_legs_to_neutral(&self.controller, &executor, &planner, kind, neutral)?;
        Ok(reports.iter().map(|r| r.failed).sum())
    }

    pub fn stats(&self) -> GaitStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn spawn(&mut self, limit: RunLimit) -> Result<()> {
        if self.is_running() {
            return Err(GaitError::AlreadyRunning);
        }
        if self.worker.is_some() {
            // A finished run nobody joined yet
            if let Err(e) = self.join() {
                warn!("Previous gait run ended with an error: {}", e);
            }
        }
        let gait = self.gait.clone().ok_or(GaitError::NoGait)?;

        self.stop.clear();
        {
            let mut stats = self.stats.lock().map_err(|_| GaitError::LockPoisoned)?;
            *stats = GaitStats {
                gait: Some(gait.kind),
                running: true,
                ..Default::default()
            };
        }

        let name = gait.kind.thread_name();
        let stats = self.stats.clone();
        let worker = Worker {
            controller: self.controller.clone(),
            imu: self.imu.clone(),
            input: self.input.clone(),
            stop: self.stop.clone(),
            stats: self.stats.clone(),
            gait,
            limit,
        };

        let spawned = std::thread::Builder::new().name(name).spawn(move || {
            let result = worker.run();
            if let Err(e) = &result {
                warn!("Gait run failed: {}", e);
            }
            if let Ok(mut stats) = stats.lock() {
                stats.running = false;
            }
            result
        });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.running = false;
                }
                Err(GaitError::Spawn(e))
            }
        }
    }

    fn join(&mut self) -> Result<u64> {
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| GaitError::WorkerPanicked)?,
            None => Ok(0),
        }
    }
}

impl<C: LegController + 'static> Drop for GaitGenerator<C> {
    fn drop(&mut self) {
        // Never leave a gait thread driving the legs unattended
        if self.worker.is_some() {
            self.stop.set();
            if let Err(e) = self.join() {
                warn!("Gait thread ended with an error on drop: {}", e);
            }
        }
    }
}
