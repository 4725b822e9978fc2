// 50 Hz teleop loop with watchdog
// Direction commands arrive over zenoh and are forwarded to the gait generator.
// If teleop stops sending, the watchdog resets the direction to neutral so the
// robot marches in place instead of walking off with the last command.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    CMD_TIMEOUT, HexapodConfig, LOOP_HZ, TOPIC_CMD_DIRECTION, TOPIC_CMD_GAIT, TOPIC_GAIT_STATE,
    TOPIC_HEALTH,
};
use crate::gait::{DirectionInput, GaitConfig, GaitGenerator, GaitKind};
use crate::messages::{DirectionCommand, GaitCommand, GaitTelemetry, RuntimeHealth};
use crate::robot::{Hexapod, LegController, SimulatedHexapod};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What the runtime drives and how
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub hexapod: HexapodConfig,
    pub gait: GaitKind,
    pub gait_config: GaitConfig,
    /// Drive the in-memory hexapod instead of the Maestro
    pub simulate: bool,
}

pub struct Runtime {
    latest_cmd: Option<DirectionCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DirectionCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Compute the gait input based on watchdog state
    pub fn compute_input(&mut self) -> DirectionInput {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - march in place
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), neutral direction", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            DirectionInput::default()
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            DirectionInput::from(cmd)
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            DirectionInput::default()
        }
    }
}

pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    if options.simulate {
        info!("Simulation mode: no servo commands will be sent");
        let generator = GaitGenerator::new(SimulatedHexapod::new(&options.hexapod));
        run_with(generator, &options).await
    } else {
        let hexapod = Hexapod::open(&options.hexapod)?;
        run_with(GaitGenerator::new(hexapod), &options).await
    }
}

/// Apply a gait lifecycle command. Blocking generator calls run in place on
/// the runtime worker thread.
fn on_gait_command<C: LegController + 'static>(
    generator: &mut GaitGenerator<C>,
    cmd: GaitCommand,
    options: &RuntimeOptions,
) -> Result<(), BoxError> {
    match cmd {
        GaitCommand::Start { gait } => {
            if generator.is_running() {
                warn!("Gait already running, ignoring start");
                return Ok(());
            }
            if let Some(kind) = gait {
                generator.create_gait(kind, options.gait_config.clone())?;
            }
            generator.start()?;
        }
        GaitCommand::Stop => {
            let stats = tokio::task::block_in_place(|| generator.stop())?;
            info!("Gait stopped: {:?}", stats);
        }
        GaitCommand::Home => {
            tokio::task::block_in_place(|| -> Result<(), BoxError> {
                generator.stop()?;
                let failed = generator.return_to_neutral()?;
                if failed > 0 {
                    warn!("{} waypoints failed while homing", failed);
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

async fn run_with<C: LegController + 'static>(
    mut generator: GaitGenerator<C>,
    options: &RuntimeOptions,
) -> Result<(), BoxError> {
    generator.create_gait(options.gait, options.gait_config.clone())?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_direction = session.declare_subscriber(TOPIC_CMD_DIRECTION).await?;
    let sub_gait = session.declare_subscriber(TOPIC_CMD_GAIT).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_gait = session.declare_publisher(TOPIC_GAIT_STATE).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, {} gait",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        options.gait
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_DIRECTION, TOPIC_CMD_GAIT);
    info!("Publishing to: {}, {}", TOPIC_HEALTH, TOPIC_GAIT_STATE);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Drain all pending direction commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_direction.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DirectionCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse direction command: {}", e),
            }
        }

        // 2. Gait lifecycle commands, in order
        while let Ok(Some(sample)) = sub_gait.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<GaitCommand>(&payload) {
                Ok(cmd) => {
                    info!("Received gait command: {:?}", cmd);
                    if let Err(e) = on_gait_command(&mut generator, cmd, options) {
                        warn!("Gait command {:?} failed: {}", cmd, e);
                    }
                }
                Err(e) => warn!("Failed to parse gait command: {}", e),
            }
        }

        // 3. Forward the direction (includes watchdog logic).
        // create_gait resets the generator's input, so compare against it.
        let input = runtime.compute_input();
        if input != generator.direction()? {
            generator.set_direction(input.direction, input.rotation)?;
        }

        // 4. Publish health and gait state
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;

        let telemetry = GaitTelemetry {
            stats: generator.stats(),
            direction: input,
        };
        pub_gait.put(serde_json::to_string(&telemetry)?).await?;
    }

    let stats = tokio::task::block_in_place(|| generator.stop())?;
    info!("Final gait stats: {:?}", stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3D;
    use crate::robot::LEG_COUNT;

    #[test]
    fn test_no_command_is_stale() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.compute_input(), DirectionInput::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_passes_through() {
        let mut runtime = Runtime::new();
        runtime.on_command(DirectionCommand {
            x: 0.0,
            y: 1.0,
            rotation: 0.5,
        });
        assert_eq!(runtime.compute_input(), DirectionInput::new((0.0, 1.0), 0.5));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_resets_to_neutral() {
        let mut runtime = Runtime::new();
        runtime.on_command(DirectionCommand {
            x: 1.0,
            y: 0.0,
            rotation: 0.0,
        });
        runtime.cmd_received_at = Instant::now()
            .checked_sub(CMD_TIMEOUT * 2)
            .unwrap_or_else(Instant::now);
        assert_eq!(runtime.compute_input(), DirectionInput::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gait_commands_drive_generator() {
        let options = RuntimeOptions {
            hexapod: HexapodConfig::default(),
            gait: GaitKind::Tripod,
            gait_config: GaitConfig {
                dwell_time: 0.01,
                ..Default::default()
            },
            simulate: true,
        };
        let mut generator = GaitGenerator::new(SimulatedHexapod::new(&options.hexapod));
        generator
            .create_gait(options.gait, options.gait_config.clone())
            .unwrap();

        let start = GaitCommand::Start {
            gait: Some(GaitKind::Wave),
        };
        on_gait_command(&mut generator, start, &options).unwrap();
        assert!(generator.is_running());
        assert_eq!(generator.current_gait().unwrap().kind, GaitKind::Wave);

        on_gait_command(&mut generator, GaitCommand::Home, &options).unwrap();
        assert!(!generator.is_running());
        let positions = generator.controller().lock().unwrap().current_leg_positions();
        assert_eq!(positions, [Vector3D::ZERO; LEG_COUNT]);
    }
}
