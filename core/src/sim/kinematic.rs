//! Built-in kinematic simulation backend
//!
//! A differential-drive vehicle model: throttle accelerates along the
//! heading, steering curves the path, and the wheel speeds expose the
//! differential split. Cameras render a top-down schematic encoded as
//! binary PPM. This is the default backend and the test double for the
//! session core; a real physics engine binding replaces it behind the
//! same traits.

use std::collections::BTreeMap;

use crate::error::{NeosceneError, Result};
use crate::exporter::CompiledScene;
use crate::sim::backend::{BackendInstance, CameraFrame, SimulationBackend};
use crate::sim::control::ControlCommand;

const MAX_SPEED: f64 = 5.0;
const ACCELERATION: f64 = 4.0;
const DRAG: f64 = 1.2;
const MAX_YAW_RATE: f64 = 1.6;
const WHEELBASE: f64 = 2.0;

const FRAME_WIDTH: usize = 128;
const FRAME_HEIGHT: usize = 96;
/// World extent mapped onto the frame, meters from center to edge
const VIEW_HALF_EXTENT: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicBackend;

impl KinematicBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SimulationBackend for KinematicBackend {
    fn name(&self) -> &'static str {
        "kinematic"
    }

    fn load(&self, scene: &CompiledScene) -> Result<Box<dyn BackendInstance>> {
        if scene.mjcf_xml.is_empty() {
            return Err(NeosceneError::SceneBuild {
                message: "empty scene document".to_string(),
                asset_id: None,
            });
        }
        Ok(Box::new(KinematicInstance::new(scene)))
    }
}

/// Vehicle state integrated by the kinematic model
#[derive(Debug, Clone, Copy, Default)]
struct VehicleState {
    x: f64,
    y: f64,
    yaw: f64,
    speed: f64,
}

pub struct KinematicInstance {
    timestep: f64,
    sim_time: f64,
    cameras: Vec<String>,
    vehicle: Option<String>,
    state: VehicleState,
    control: ControlCommand,
}

impl KinematicInstance {
    fn new(scene: &CompiledScene) -> Self {
        Self {
            timestep: scene.timestep,
            sim_time: 0.0,
            cameras: scene.cameras.clone(),
            vehicle: scene.vehicle.clone(),
            state: VehicleState::default(),
            control: ControlCommand::neutral(),
        }
    }

    /// Signed yaw rate for the current command. Positive steering turns
    /// right, so the rate is negative in the CCW-positive yaw convention.
    /// No turning in place: the rate scales with speed.
    fn yaw_rate(&self) -> f64 {
        let speed_factor = (self.state.speed.abs() / MAX_SPEED).min(1.0);
        -self.control.steering * MAX_YAW_RATE * speed_factor
    }

    /// Differential wheel speeds for the current commanded curvature.
    /// Same (v, kappa) split a differential-drive base uses.
    fn wheel_speeds(&self) -> (f64, f64) {
        let v = self.state.speed;
        let kappa = if v.abs() > 1e-6 {
            self.yaw_rate() / v
        } else {
            0.0
        };
        let left = (v * (1.0 - kappa * WHEELBASE / 2.0)).clamp(-MAX_SPEED, MAX_SPEED);
        let right = (v * (1.0 + kappa * WHEELBASE / 2.0)).clamp(-MAX_SPEED, MAX_SPEED);
        (left, right)
    }
}

impl BackendInstance for KinematicInstance {
    fn timestep(&self) -> f64 {
        self.timestep
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn apply_control(&mut self, control: ControlCommand) {
        self.control = control;
    }

    fn step(&mut self) -> Result<()> {
        let dt = self.timestep;

        if self.vehicle.is_some() {
            let accel = self.control.throttle * ACCELERATION - self.state.speed * DRAG;
            self.state.speed = (self.state.speed + accel * dt).clamp(-MAX_SPEED, MAX_SPEED);

            self.state.yaw += self.yaw_rate() * dt;

            self.state.x += self.state.speed * self.state.yaw.cos() * dt;
            self.state.y += self.state.speed * self.state.yaw.sin() * dt;
        }

        self.sim_time += dt;
        Ok(())
    }

    fn read_sensors(&self) -> BTreeMap<String, Vec<f64>> {
        let mut values = BTreeMap::new();
        if let Some(vehicle) = &self.vehicle {
            let (left, right) = self.wheel_speeds();
            values.insert(
                format!("{}.position", vehicle),
                vec![self.state.x, self.state.y, 0.0],
            );
            values.insert(format!("{}.yaw", vehicle), vec![self.state.yaw]);
            values.insert(format!("{}.speed", vehicle), vec![self.state.speed]);
            values.insert(format!("{}.wheel_speeds", vehicle), vec![left, right]);
        }
        values
    }

    fn render(&mut self, camera: &str, tick: u64) -> Result<CameraFrame> {
        if !self.cameras.iter().any(|c| c == camera) {
            return Err(NeosceneError::RenderFailed {
                reason: format!("camera '{}' not in scene", camera),
            });
        }

        let mut pixels = vec![0u8; FRAME_WIDTH * FRAME_HEIGHT * 3];

        // Ground
        for pixel in pixels.chunks_exact_mut(3) {
            pixel[0] = 30;
            pixel[1] = 48;
            pixel[2] = 30;
        }

        // Frame border
        for x in 0..FRAME_WIDTH {
            put_pixel(&mut pixels, x, 0, [90, 90, 90]);
            put_pixel(&mut pixels, x, FRAME_HEIGHT - 1, [90, 90, 90]);
        }
        for y in 0..FRAME_HEIGHT {
            put_pixel(&mut pixels, 0, y, [90, 90, 90]);
            put_pixel(&mut pixels, FRAME_WIDTH - 1, y, [90, 90, 90]);
        }

        // Vehicle marker plus heading tip
        if self.vehicle.is_some() {
            if let Some((cx, cy)) = world_to_frame(self.state.x, self.state.y) {
                for dy in -2i32..=2 {
                    for dx in -2i32..=2 {
                        let px = cx as i32 + dx;
                        let py = cy as i32 + dy;
                        if px >= 0 && py >= 0 {
                            put_pixel(&mut pixels, px as usize, py as usize, [210, 70, 60]);
                        }
                    }
                }
                let tip_x = self.state.x + 1.5 * self.state.yaw.cos();
                let tip_y = self.state.y + 1.5 * self.state.yaw.sin();
                if let Some((tx, ty)) = world_to_frame(tip_x, tip_y) {
                    put_pixel(&mut pixels, tx, ty, [250, 240, 120]);
                }
            }
        }

        let mut data = format!("P6\n{} {}\n255\n", FRAME_WIDTH, FRAME_HEIGHT).into_bytes();
        data.extend_from_slice(&pixels);

        Ok(CameraFrame {
            camera: camera.to_string(),
            content_type: "image/x-portable-pixmap".to_string(),
            data,
            tick,
        })
    }
}

fn world_to_frame(x: f64, y: f64) -> Option<(usize, usize)> {
    let fx = (x / VIEW_HALF_EXTENT / 2.0 + 0.5) * FRAME_WIDTH as f64;
    // World +y is up, frame +y is down
    let fy = (0.5 - y / VIEW_HALF_EXTENT / 2.0) * FRAME_HEIGHT as f64;
    if fx < 0.0 || fy < 0.0 || fx >= FRAME_WIDTH as f64 || fy >= FRAME_HEIGHT as f64 {
        return None;
    }
    Some((fx as usize, fy as usize))
}

fn put_pixel(pixels: &mut [u8], x: usize, y: usize, rgb: [u8; 3]) {
    if x >= FRAME_WIDTH || y >= FRAME_HEIGHT {
        return;
    }
    let offset = (y * FRAME_WIDTH + x) * 3;
    pixels[offset..offset + 3].copy_from_slice(&rgb);
}
