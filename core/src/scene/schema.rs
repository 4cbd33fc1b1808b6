//! Scene specification schema - the intermediate representation (IR)
//!
//! The LLM generates JSON conforming to `SceneSpec`; the exporter converts
//! it to MJCF. Orientation uses Euler angles in degrees for readability,
//! applied yaw (Z) -> pitch (Y) -> roll (X).

use serde::{Deserialize, Serialize};

use crate::error::{NeosceneError, Result};

/// 3D pose: position in meters plus Euler angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// [x, y, z] position in meters
    pub position: [f64; 3],
    #[serde(default)]
    pub yaw_deg: f64,
    #[serde(default)]
    pub pitch_deg: f64,
    #[serde(default)]
    pub roll_deg: f64,
}

impl Pose {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: [x, y, z],
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
        }
    }
}

/// Layout objects in a regular grid pattern starting at origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    #[serde(default = "default_origin")]
    pub origin: [f64; 3],
    pub rows: u32,
    pub cols: u32,
    /// [dx, dy] spacing between objects in meters
    pub spacing: [f64; 2],
    /// Random yaw variation per object in degrees
    #[serde(default)]
    pub yaw_variation_deg: f64,
}

/// Layout objects randomly within a circular area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomLayout {
    /// [x, y, z] center of the spawn area; z is used for all objects
    pub center: [f64; 3],
    pub radius: f64,
    pub count: u32,
    /// Minimum distance between objects in meters
    #[serde(default)]
    pub min_separation: f64,
    #[serde(default = "default_true")]
    pub random_yaw: bool,
}

/// Placement pattern for multiple instances of one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layout {
    Grid(GridLayout),
    Random(RandomLayout),
}

/// Explicit instance with a fixed pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub pose: Pose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
}

/// One or more instances of a catalog asset.
///
/// Exactly one of (`instances`, `layout`) may be provided; neither means a
/// single instance at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<InstanceSpec>>,
}

/// Camera for scene observation, posed directly or aimed at a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub name: String,
    /// Optional sensor asset from the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub pose: Pose,
    /// Optional [x, y, z] look-at point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<[f64; 3]>,
    /// Vertical FOV in degrees
    #[serde(default = "default_fovy")]
    pub fovy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// Additional light beyond the environment default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_light_type")]
    pub kind: LightType,
    #[serde(default = "default_light_position")]
    pub position: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<[f64; 3]>,
    #[serde(default = "default_diffuse")]
    pub diffuse: [f64; 3],
    #[serde(default = "default_specular")]
    pub specular: [f64; 3],
}

/// Base environment asset and global settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[f64; 3]>,
    #[serde(default = "default_gravity")]
    pub gravity: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Solver {
    #[serde(rename = "PGS")]
    Pgs,
    #[serde(rename = "CG")]
    Cg,
    Newton,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Pgs => "PGS",
            Solver::Cg => "CG",
            Solver::Newton => "Newton",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integrator {
    Euler,
    #[serde(rename = "RK4")]
    Rk4,
    #[serde(rename = "implicit")]
    Implicit,
    #[serde(rename = "implicitfast")]
    ImplicitFast,
}

impl Integrator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Integrator::Euler => "Euler",
            Integrator::Rk4 => "RK4",
            Integrator::Implicit => "implicit",
            Integrator::ImplicitFast => "implicitfast",
        }
    }
}

/// Physics simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSpec {
    /// Simulation timestep in seconds
    #[serde(default = "default_timestep")]
    pub timestep: f64,
    #[serde(default = "default_solver")]
    pub solver: Solver,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_integrator")]
    pub integrator: Integrator,
}

impl Default for PhysicsSpec {
    fn default() -> Self {
        Self {
            timestep: default_timestep(),
            solver: default_solver(),
            iterations: default_iterations(),
            integrator: default_integrator(),
        }
    }
}

/// Complete scene specification.
///
/// Fully describes a simulated scene: environment, objects, cameras,
/// lights, and physics settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub environment: EnvironmentSpec,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub cameras: Vec<CameraSpec>,
    #[serde(default)]
    pub lights: Vec<LightSpec>,
    #[serde(default)]
    pub physics: PhysicsSpec,
}

impl SceneSpec {
    /// Structural validation beyond what serde enforces.
    ///
    /// Returns every violation, not just the first, so the repair loop can
    /// hand the full list back to the generator.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name: must not be empty".to_string());
        }

        for (i, obj) in self.objects.iter().enumerate() {
            if obj.layout.is_some() && obj.instances.is_some() {
                errors.push(format!(
                    "objects[{}]: cannot specify both 'layout' and 'instances'",
                    i
                ));
            }
            match &obj.layout {
                Some(Layout::Grid(grid)) => {
                    if grid.rows == 0 || grid.cols == 0 {
                        errors.push(format!("objects[{}]: grid rows/cols must be >= 1", i));
                    }
                }
                Some(Layout::Random(random)) => {
                    if random.radius <= 0.0 {
                        errors.push(format!("objects[{}]: random radius must be > 0", i));
                    }
                    if random.count == 0 {
                        errors.push(format!("objects[{}]: random count must be >= 1", i));
                    }
                }
                None => {}
            }
        }

        for (i, cam) in self.cameras.iter().enumerate() {
            if cam.name.trim().is_empty() {
                errors.push(format!("cameras[{}]: name must not be empty", i));
            }
            if !(1.0..=180.0).contains(&cam.fovy) {
                errors.push(format!("cameras[{}]: fovy must be within [1, 180]", i));
            }
        }

        if !(self.physics.timestep > 0.0 && self.physics.timestep <= 0.1) {
            errors.push("physics.timestep: must be within (0, 0.1]".to_string());
        }

        errors
    }

    /// Validate, converting violations into a `SceneValidation` error
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NeosceneError::SceneValidation {
                message: format!("SceneSpec validation failed: {} errors", errors.len()),
                errors,
                raw_preview: None,
            })
        }
    }

    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            scene_name: self.name.clone(),
            environment_asset_id: self.environment.asset_id.clone(),
            object_count: self.objects.len(),
            camera_count: self.cameras.len(),
        }
    }

    /// First declared camera, the default for camera reads
    pub fn default_camera(&self) -> Option<&str> {
        self.cameras.first().map(|c| c.name.as_str())
    }
}

/// Small summary of a scene for replies and the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub scene_name: String,
    pub environment_asset_id: String,
    pub object_count: usize,
    pub camera_count: usize,
}

fn default_origin() -> [f64; 3] {
    [0.0, 0.0, 0.0]
}

fn default_true() -> bool {
    true
}

fn default_fovy() -> f64 {
    45.0
}

fn default_light_type() -> LightType {
    LightType::Directional
}

fn default_light_position() -> [f64; 3] {
    [0.0, 0.0, 10.0]
}

fn default_diffuse() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

fn default_specular() -> [f64; 3] {
    [0.5, 0.5, 0.5]
}

fn default_gravity() -> [f64; 3] {
    [0.0, 0.0, -9.81]
}

fn default_timestep() -> f64 {
    0.002
}

fn default_solver() -> Solver {
    Solver::Newton
}

fn default_iterations() -> u32 {
    50
}

fn default_integrator() -> Integrator {
    Integrator::ImplicitFast
}

/// Example spec used in tests and the offline demo path
pub fn example_scene_spec() -> SceneSpec {
    SceneSpec {
        name: "orchard_demo".to_string(),
        description: Some("An orchard with a tractor and some crates".to_string()),
        environment: EnvironmentSpec {
            asset_id: "orchard".to_string(),
            size: None,
            gravity: default_gravity(),
        },
        objects: vec![
            ObjectSpec {
                asset_id: "tractor_bluewhite".to_string(),
                name: Some("main_tractor".to_string()),
                layout: None,
                instances: Some(vec![InstanceSpec {
                    pose: Pose {
                        position: [5.0, 2.0, 0.0],
                        yaw_deg: 45.0,
                        pitch_deg: 0.0,
                        roll_deg: 0.0,
                    },
                    name_suffix: Some("1".to_string()),
                }]),
            },
            ObjectSpec {
                asset_id: "crate_wooden_small".to_string(),
                name: Some("storage_crates".to_string()),
                layout: Some(Layout::Grid(GridLayout {
                    origin: [-3.0, -3.0, 0.0],
                    rows: 2,
                    cols: 3,
                    spacing: [0.8, 0.6],
                    yaw_variation_deg: 0.0,
                })),
                instances: None,
            },
        ],
        cameras: vec![
            CameraSpec {
                name: "overview_cam".to_string(),
                asset_id: None,
                pose: Pose {
                    position: [0.0, 0.0, 15.0],
                    yaw_deg: 0.0,
                    pitch_deg: -90.0,
                    roll_deg: 0.0,
                },
                target: None,
                fovy: 60.0,
            },
            CameraSpec {
                name: "tractor_cam".to_string(),
                asset_id: None,
                pose: Pose::at(8.0, 5.0, 2.0),
                target: Some([5.0, 2.0, 1.0]),
                fovy: 45.0,
            },
        ],
        lights: vec![LightSpec {
            name: "sun".to_string(),
            kind: LightType::Directional,
            position: [0.0, 0.0, 20.0],
            direction: Some([0.5, 0.5, -1.0]),
            diffuse: [1.0, 0.95, 0.9],
            specular: default_specular(),
        }],
        physics: PhysicsSpec::default(),
    }
}
