pub mod config;
pub mod gait;
pub mod geometry;
pub mod imu;
pub mod messages;
pub mod robot;
pub mod runtime;
