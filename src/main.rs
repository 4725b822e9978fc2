use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexapod_gait_runtime::config::HexapodConfig;
use hexapod_gait_runtime::gait::{GaitConfig, GaitKind};
use hexapod_gait_runtime::runtime::{self, RuntimeOptions};

/// Hexapod gait runtime: walks on commands received over Zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Hexapod configuration file (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maestro serial port, overrides the configuration file
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baudrate, overrides the configuration file
    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Gait to walk with (tripod or wave)
    #[arg(short, long, default_value = "tripod")]
    gait: GaitKind,

    /// Do not open the servo controller
    #[arg(long)]
    simulate: bool,

    /// Step radius in mm
    #[arg(long)]
    step_radius: Option<f64>,

    /// Swing lift height in mm
    #[arg(long)]
    lift: Option<f64>,

    /// Minimum time per phase in seconds
    #[arg(long)]
    dwell: Option<f64>,
}

impl Args {
    fn into_options(self) -> Result<RuntimeOptions, Box<dyn std::error::Error + Send + Sync>> {
        let mut hexapod = match &self.config {
            Some(path) => HexapodConfig::load(path)?,
            None => HexapodConfig::default(),
        };
        if let Some(port) = self.port {
            hexapod.controller.port = port;
        }
        if let Some(baudrate) = self.baudrate {
            hexapod.controller.baudrate = baudrate;
        }
        hexapod.validate()?;

        let mut gait_config = GaitConfig::default();
        if let Some(radius) = self.step_radius {
            gait_config.step_radius = radius;
        }
        if let Some(lift) = self.lift {
            gait_config.leg_lift_distance = lift;
        }
        if let Some(dwell) = self.dwell {
            gait_config.dwell_time = dwell;
        }
        gait_config.validate()?;

        Ok(RuntimeOptions {
            hexapod,
            gait: self.gait,
            gait_config,
            simulate: self.simulate,
        })
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let options = match Args::parse().into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    info!("Starting with {:?}", options);

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
