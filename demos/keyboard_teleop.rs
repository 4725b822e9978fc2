// Keyboard teleop: WASD walk, Z/X turn, R/F stride, G start, Space stop, H home, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use hexapod_gait_runtime::config::{TOPIC_CMD_DIRECTION, TOPIC_CMD_GAIT};
use hexapod_gait_runtime::gait::GaitKind;
use hexapod_gait_runtime::messages::{DirectionCommand, GaitCommand};
use std::time::{Duration, Instant};
use tracing::info;

const STRIDES: [f64; 3] = [0.4, 0.7, 1.0]; // fraction of the step radius
const INPUT_TIMEOUT_MS: u64 = 100; // Reset direction after this much time with no input

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_direction = session.declare_publisher(TOPIC_CMD_DIRECTION).await?;
    let pub_gait = session.declare_publisher(TOPIC_CMD_GAIT).await?;

    info!("Controls: WASD=walk, Z/X=turn, R/F=stride, G=start tripod, T=start wave, Space=stop, H=home, Q=quit");
    print_stride(0);

    enable_raw_mode()?;
    let result = run_teleop(&pub_direction, &pub_gait).await;
    disable_raw_mode()?;

    result
}

async fn send_gait(publisher: &zenoh::pubsub::Publisher<'_>, cmd: GaitCommand) -> Result<(), BoxError> {
    info!("Sending {:?}", cmd);
    publisher.put(serde_json::to_string(&cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    pub_direction: &zenoh::pubsub::Publisher<'_>,
    pub_gait: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), BoxError> {
    let mut stride_idx: usize = 0;

    // Persistent direction state
    let mut cmd = DirectionCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let stride = STRIDES[stride_idx];

                match code {
                    // Walking - body frame, +y forward, +x right
                    KeyCode::Char('w') if pressed => {
                        cmd.y = stride;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.y = -stride;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.x = -stride;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.x = stride;
                        last_movement_input = Instant::now();
                    }

                    // Turning, positive is clockwise
                    KeyCode::Char('z') if pressed => {
                        cmd.rotation = -stride;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        cmd.rotation = stride;
                        last_movement_input = Instant::now();
                    }

                    // Stride control
                    KeyCode::Char('r') if pressed => {
                        stride_idx = (stride_idx + 1).min(STRIDES.len() - 1);
                        print_stride(stride_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        stride_idx = stride_idx.saturating_sub(1);
                        print_stride(stride_idx);
                    }

                    // Gait lifecycle
                    KeyCode::Char('g') if pressed => {
                        send_gait(pub_gait, GaitCommand::Start { gait: Some(GaitKind::Tripod) }).await?
                    }
                    KeyCode::Char('t') if pressed => {
                        send_gait(pub_gait, GaitCommand::Start { gait: Some(GaitKind::Wave) }).await?
                    }
                    KeyCode::Char(' ') if pressed => send_gait(pub_gait, GaitCommand::Stop).await?,
                    KeyCode::Char('h') if pressed => send_gait(pub_gait, GaitCommand::Home).await?,

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset direction if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = DirectionCommand::default();
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        pub_direction.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_stride(idx: usize) {
    let label = ["SHORT", "MEDIUM", "FULL"][idx];
    info!("Stride: {}", label);
}
