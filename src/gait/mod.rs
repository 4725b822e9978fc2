// Gait engine for the hexapod
//
// Provides:
// - Tripod and wave phase machines
// - Leg target calculation on the step circle and swing/stance trajectories
// - The gait generator that runs phases on a worker thread

pub mod config;
pub mod executor;
pub mod generator;
pub mod input;
pub mod phase;
pub mod signal;
pub mod target;
pub mod trajectory;

pub use config::GaitConfig;
pub use generator::{GaitGenerator, GaitStats};
pub use input::{DirectionInput, named_direction};
pub use phase::{GaitKind, GaitPhase, GaitState, LegSet};
pub use signal::StopSignal;

use crate::robot::controller::LegError;

/// Error types for the gait engine
#[derive(Debug, thiserror::Error)]
pub enum GaitError {
    #[error("Invalid gait config: {0}")]
    InvalidConfig(String),

    #[error("Gait is already running, stop it first")]
    AlreadyRunning,

    #[error("No gait has been created")]
    NoGait,

    #[error("Unknown gait type: {0}")]
    UnknownGait(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Gait state lock poisoned")]
    LockPoisoned,

    #[error("Gait worker thread panicked")]
    WorkerPanicked,

    #[error("Worker thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Leg controller error: {0}")]
    Controller(#[from] LegError),
}

pub type Result<T> = std::result::Result<T, GaitError>;
