//! Simulation runtime: backend seam, built-in kinematic backend, and the
//! per-session stepping worker

pub mod backend;
pub mod control;
pub mod kinematic;
pub mod worker;

pub use backend::{BackendInstance, CameraFrame, SensorSnapshot, SimulationBackend};
pub use control::ControlCommand;
pub use kinematic::KinematicBackend;
pub use worker::{SimWorker, WorkerConfig};
