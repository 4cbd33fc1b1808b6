//! Physics backend seam
//!
//! The core never does physics itself: it drives a [`BackendInstance`]
//! obtained from a [`SimulationBackend`]. The in-tree implementation is the
//! kinematic backend; a real engine binding plugs in behind the same traits.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::exporter::CompiledScene;
use crate::sim::control::ControlCommand;

/// Point-in-time view of the simulation's sensor channels.
///
/// Recomputed by the stepping worker every tick; never persisted. `stale`
/// is set when the producing worker has degraded and the values are the
/// last good ones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorSnapshot {
    pub values: BTreeMap<String, Vec<f64>>,
    pub sim_time: f64,
    pub stale: bool,
}

/// One rendered camera image, encoded by the backend
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub camera: String,
    pub content_type: String,
    pub data: Vec<u8>,
    /// Stepping tick the frame was rendered at
    pub tick: u64,
}

/// Factory for loaded simulation instances
pub trait SimulationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load a compiled scene into a fresh instance.
    ///
    /// Failure must leave no residue; callers treat it as `SceneBuildError`
    /// and keep whatever instance they already had.
    fn load(&self, scene: &CompiledScene) -> Result<Box<dyn BackendInstance>>;
}

/// One loaded simulation, exclusively owned by its stepping worker
pub trait BackendInstance: Send {
    /// Fixed timestep in seconds
    fn timestep(&self) -> f64;

    /// Elapsed simulated time in seconds
    fn sim_time(&self) -> f64;

    /// Feed actuation inputs for the next step
    fn apply_control(&mut self, control: ControlCommand);

    /// Advance by one fixed timestep
    fn step(&mut self) -> Result<()>;

    /// Current sensor channel values
    fn read_sensors(&self) -> BTreeMap<String, Vec<f64>>;

    /// Render the named camera to encoded image bytes
    fn render(&mut self, camera: &str, tick: u64) -> Result<CameraFrame>;
}
