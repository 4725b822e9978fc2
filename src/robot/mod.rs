// Robot hardware layer for the hexapod
//
// Provides:
// - Pololu Maestro serial protocol implementation
// - Joint limits and per-leg inverse/forward kinematics
// - Leg-level controller trait with hardware and simulated implementations

pub mod controller;
pub mod hexapod;
pub mod joint;
pub mod leg;
pub mod maestro;
pub mod sim;

pub use controller::{JointAngles, LEG_COUNT, LegController, LegError, LegGeometry};
pub use hexapod::Hexapod;
pub use maestro::{MaestroBus, MaestroError, ServoBus};
pub use sim::SimulatedHexapod;
