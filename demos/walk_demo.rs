// Walk demo: a short scripted walk, turn and return to neutral
//
// IMPORTANT: Run servo_diagnostic FIRST to verify read-only communication.
// Without --hardware the demo drives the simulated hexapod and only logs.
//
// Usage: cargo run --example walk_demo -- [--hardware] [--port PORT] [--gait wave]
// Example: cargo run --example walk_demo -- --direction "forward left" --seconds 4
//
// Safety features:
// - Explicit confirmation before any servo moves
// - Legs return to neutral before the servos are released
// - Easy abort with Ctrl+C

use clap::Parser;
use hexapod_gait_runtime::config::{HexapodConfig, PredefinedPosition, SERVO_PORT};
use hexapod_gait_runtime::gait::{GaitConfig, GaitGenerator, GaitKind};
use hexapod_gait_runtime::robot::{Hexapod, LegController, SimulatedHexapod};
use std::io::{self, Write};
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(about = "Scripted hexapod walk")]
struct Args {
    /// Drive the servos instead of the simulated hexapod
    #[arg(long)]
    hardware: bool,

    #[arg(short, long, default_value = SERVO_PORT)]
    port: String,

    #[arg(short, long, default_value = "tripod")]
    gait: GaitKind,

    /// Named direction, e.g. "forward", "backward right"
    #[arg(short, long, default_value = "forward")]
    direction: String,

    /// How long to walk
    #[arg(short, long, default_value_t = 3.0)]
    seconds: f64,

    /// Turn on the spot by this many degrees after walking (0 to skip)
    #[arg(long, default_value_t = 30.0)]
    turn: f64,
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn walk<C: LegController + 'static>(generator: &mut GaitGenerator<C>, args: &Args) -> Result<(), BoxError> {
    generator.create_gait(args.gait, GaitConfig::default())?;

    println!("Walking {} for {:.1}s with the {} gait...", args.direction, args.seconds, args.gait);
    generator.set_named_direction(&args.direction, 0.0)?;
    let (cycles, elapsed) = generator.run_for_duration(Duration::from_secs_f64(args.seconds))?;
    println!("  ✓ {} cycles in {:.2?}", cycles, elapsed);

    if args.turn != 0.0 {
        let rotation = args.turn.signum();
        println!("Turning {:.0}°...", args.turn);
        let cycles = generator.execute_rotation_by_angle(args.turn.abs(), rotation)?;
        println!("  ✓ {} cycles", cycles);
    }

    println!("Returning to neutral...");
    let failed = generator.return_to_neutral()?;
    if failed > 0 {
        println!("  ⚠ {} waypoints failed", failed);
    }

    let stats = generator.stats();
    println!();
    println!("Summary: {}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn main() -> Result<(), BoxError> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = HexapodConfig::default();
    config.controller.port = args.port.clone();

    if !args.hardware {
        println!("Simulation mode: no servo commands are sent");
        let mut generator = GaitGenerator::new(SimulatedHexapod::new(&config));
        return walk(&mut generator, &args);
    }

    println!("Hardware mode on {}", config.controller.port);
    println!("Make sure the robot is lifted or has room to walk.");
    if !confirm("Stand up and start walking?")? {
        println!("Aborted.");
        return Ok(());
    }

    let mut hexapod = Hexapod::open(&config)?;
    hexapod.move_to_position(PredefinedPosition::Upright)?;

    let mut generator = GaitGenerator::new(hexapod);
    let result = walk(&mut generator, &args);

    println!("Releasing servos...");
    let controller = generator.controller();
    let mut hexapod = controller.lock().map_err(|_| "hexapod lock poisoned")?;
    hexapod.deactivate_all_servos()?;
    println!("  ✓ Done");

    result
}
