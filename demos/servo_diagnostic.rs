// Servo diagnostic: READ-ONLY check of the Maestro link
//
// This tool does NOT move any servo - it only reads the error register,
// channel positions and the moving flag.
//
// Usage: cargo run --example servo_diagnostic -- [--port PORT] [--baudrate N] [--device N]
// Example: cargo run --example servo_diagnostic -- --port /dev/ttyACM0

use clap::Parser;
use hexapod_gait_runtime::config::{CONTROLLER_CHANNELS, HexapodConfig, SERVO_PORT};
use hexapod_gait_runtime::robot::controller::LEG_NAMES;
use hexapod_gait_runtime::robot::maestro::{
    DEFAULT_BAUDRATE, DEFAULT_DEVICE_NUMBER, MaestroBus, ServoBus, describe_errors,
};

#[derive(Debug, Parser)]
#[command(about = "Read-only Maestro diagnostic")]
struct Args {
    #[arg(short, long, default_value = SERVO_PORT)]
    port: String,

    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE)]
    baudrate: u32,

    /// Pololu protocol device number
    #[arg(short, long, default_value_t = DEFAULT_DEVICE_NUMBER)]
    device: u8,
}

/// Which joint of which leg a channel drives under the default channel maps
fn channel_label(config: &HexapodConfig, channel: u8) -> String {
    let maps = [
        ("coxa", &config.coxa_channel_map),
        ("femur", &config.femur_channel_map),
        ("tibia", &config.tibia_channel_map),
    ];
    for (joint, map) in maps {
        if let Some(leg) = map.iter().position(|&c| c == channel) {
            return format!("{} {}", LEG_NAMES[leg], joint);
        }
    }
    "unused".to_string()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = HexapodConfig::default();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Hexapod Servo Diagnostic (READ-ONLY)                ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool only READS from the Maestro - no servo movement   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Serial port: {} @ {} baud", args.port, args.baudrate);
    println!("Device number: {:#04x}", args.device);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match MaestroBus::open_with_baudrate(&args.port, args.baudrate) {
        Ok(bus) => {
            println!("  ✓ Serial port opened successfully");
            bus.with_device_number(args.device)
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct (command port, not TTL port)");
            println!("  - Verify the USB cable is connected");
            println!("  - Set the Maestro serial mode to USB Dual Port or USB Chained");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Reading error register...");
    match bus.get_errors() {
        Ok(0) => println!("  ✓ No errors"),
        Ok(code) => {
            println!("  ⚠ Error register {:#06x}:", code);
            for name in describe_errors(code) {
                println!("    - {}", name);
            }
        }
        Err(e) => {
            println!("  ✗ No reply: {}", e);
            println!("  - Check the device number and baudrate");
            return Err(e.into());
        }
    }
    println!();

    println!("Step 3: Reading channel positions...");
    for channel in 0..CONTROLLER_CHANNELS as u8 {
        let label = channel_label(&config, channel);
        match bus.get_position(channel) {
            Ok(0) => println!("  Channel {:2} ({:<17}): off", channel, label),
            Ok(pos) => println!(
                "  Channel {:2} ({:<17}): {} ({:.1}us)",
                channel,
                label,
                pos,
                pos as f64 / 4.0
            ),
            Err(e) => println!("  Channel {:2} ({:<17}): ERROR - {}", channel, label, e),
        }
    }
    println!();

    println!("Step 4: Reading moving state...");
    match bus.get_moving_state() {
        Ok(true) => println!("  Servos are moving"),
        Ok(false) => println!("  ✓ All servos idle"),
        Err(e) => println!("  ✗ ERROR - {}", e),
    }
    println!();
    println!("Diagnostic complete.");

    Ok(())
}
