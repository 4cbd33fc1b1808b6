//! MJCF exporter - converts SceneSpec to the backend's native scene format
//!
//! The output is a [`CompiledScene`]: the full MJCF XML plus the resolved
//! metadata the runtime needs without re-parsing XML (camera names, physics
//! timestep, the drivable body if any). Layouts are expanded here with a
//! seeded RNG so exports are reproducible.

use std::fmt::Write as _;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::assets::AssetCatalog;
use crate::error::{NeosceneError, Result};
use crate::scene::schema::{InstanceSpec, Layout, ObjectSpec, Pose, SceneSpec};

/// Default seed for layout expansion; callers can pass their own
pub const DEFAULT_SEED: u64 = 42;

/// The physics backend's native scene format
#[derive(Debug, Clone)]
pub struct CompiledScene {
    pub scene_name: String,
    pub mjcf_xml: String,
    /// Camera names in declaration order; first is the default camera
    pub cameras: Vec<String>,
    pub timestep: f64,
    /// Body name of the first drivable object instance, if any
    pub vehicle: Option<String>,
    /// Total object instances after layout expansion
    pub instance_count: usize,
}

/// Convert a scene to MJCF XML only
pub fn scene_to_mjcf(scene: &SceneSpec, catalog: &AssetCatalog, seed: u64) -> Result<String> {
    Ok(compile(scene, catalog, seed)?.mjcf_xml)
}

/// Compile a scene into the backend's native format.
///
/// Fails with `AssetNotFound`/`SceneBuild` without touching any session
/// state; callers rely on that for transactional reloads.
pub fn compile(scene: &SceneSpec, catalog: &AssetCatalog, seed: u64) -> Result<CompiledScene> {
    scene.validate()?;

    let mut xml = String::new();
    let mut assets_xml = String::new();
    let mut sensors_xml = String::new();
    let mut vehicle: Option<String> = None;
    let mut instance_count = 0usize;

    let _ = writeln!(
        xml,
        "<mujoco model=\"{}\">",
        escape_attr(&scene.name)
    );
    xml.push_str("  <compiler angle=\"degree\" coordinate=\"local\"/>\n");
    let _ = writeln!(
        xml,
        "  <option timestep=\"{}\" iterations=\"{}\" solver=\"{}\" integrator=\"{}\" gravity=\"{}\"/>",
        scene.physics.timestep,
        scene.physics.iterations,
        scene.physics.solver.as_str(),
        scene.physics.integrator.as_str(),
        fmt_vec(&scene.environment.gravity)
    );
    xml.push_str("  <visual>\n");
    xml.push_str("    <headlight diffuse=\"0.6 0.6 0.6\" ambient=\"0.3 0.3 0.3\"/>\n");
    xml.push_str("  </visual>\n");

    let mut worldbody = String::new();

    // Lights: a default headlight-style light unless the scene declares its own
    if scene.lights.is_empty() {
        worldbody.push_str(
            "    <light name=\"default_light\" pos=\"0 0 10\" dir=\"0 0 -1\" diffuse=\"1 1 1\"/>\n",
        );
    } else {
        for light in &scene.lights {
            let _ = write!(
                worldbody,
                "    <light name=\"{}\" pos=\"{}\"",
                escape_attr(&light.name),
                fmt_vec(&light.position)
            );
            if let Some(dir) = &light.direction {
                let _ = write!(worldbody, " dir=\"{}\"", fmt_vec(dir));
            }
            let _ = write!(
                worldbody,
                " diffuse=\"{}\" specular=\"{}\"",
                fmt_vec(&light.diffuse),
                fmt_vec(&light.specular)
            );
            if light.kind == crate::scene::schema::LightType::Directional {
                worldbody.push_str(" directional=\"true\"");
            }
            worldbody.push_str("/>\n");
        }
    }

    // Environment body
    let env_id = &scene.environment.asset_id;
    let env_fragment = load_asset_fragment(catalog, env_id, &format!("env_{}", env_id))?;
    let _ = writeln!(
        worldbody,
        "    <body name=\"env_{}\" pos=\"0 0 0\">",
        escape_attr(env_id)
    );
    push_indented(&mut worldbody, &env_fragment.worldbody, "      ");
    worldbody.push_str("    </body>\n");
    assets_xml.push_str(&env_fragment.assets);
    sensors_xml.push_str(&env_fragment.sensors);

    // Objects
    for obj in &scene.objects {
        let manifest = catalog
            .get(&obj.asset_id)
            .ok_or_else(|| NeosceneError::AssetNotFound {
                asset_id: obj.asset_id.clone(),
                suggestions: catalog.suggestions_for(&obj.asset_id),
            })?;
        let drivable = manifest.category.is_drivable();

        let instances = layout_instances(obj, seed);
        let name_base = obj.name.clone().unwrap_or_else(|| obj.asset_id.clone());

        for (idx, inst) in instances.iter().enumerate() {
            let body_name = match &inst.name_suffix {
                Some(suffix) => format!("{}_{}", name_base, suffix),
                None => format!("{}_{}", name_base, idx),
            };

            if drivable && vehicle.is_none() {
                vehicle = Some(body_name.clone());
            }

            let fragment = load_asset_fragment(catalog, &obj.asset_id, &body_name)?;

            let _ = write!(
                worldbody,
                "    <body name=\"{}\" pos=\"{}\"",
                escape_attr(&body_name),
                fmt_vec(&inst.pose.position)
            );
            let (roll, pitch, yaw) = euler_deg(&inst.pose);
            if roll != 0.0 || pitch != 0.0 || yaw != 0.0 {
                let _ = write!(worldbody, " euler=\"{}\"", fmt_vec(&[roll, pitch, yaw]));
            }
            worldbody.push_str(">\n");
            push_indented(&mut worldbody, &fragment.worldbody, "      ");
            worldbody.push_str("    </body>\n");
            assets_xml.push_str(&fragment.assets);
            sensors_xml.push_str(&fragment.sensors);
            instance_count += 1;
        }
    }

    // Cameras
    for cam in &scene.cameras {
        if let Some(asset_id) = &cam.asset_id {
            if !catalog.contains(asset_id) {
                return Err(NeosceneError::AssetNotFound {
                    asset_id: asset_id.clone(),
                    suggestions: catalog.suggestions_for(asset_id),
                });
            }
        }
        let _ = write!(
            worldbody,
            "    <camera name=\"{}\" pos=\"{}\" fovy=\"{}\"",
            escape_attr(&cam.name),
            fmt_vec(&cam.pose.position),
            cam.fovy
        );
        let (roll, pitch, yaw) = match &cam.target {
            Some(target) => look_at_euler(&cam.pose.position, target),
            None => euler_deg(&cam.pose),
        };
        if roll != 0.0 || pitch != 0.0 || yaw != 0.0 {
            let _ = write!(worldbody, " euler=\"{}\"", fmt_vec(&[roll, pitch, yaw]));
        }
        worldbody.push_str("/>\n");
    }

    xml.push_str("  <asset>\n");
    xml.push_str(
        "    <texture name=\"grid\" type=\"2d\" builtin=\"checker\" width=\"512\" height=\"512\" rgb1=\"0.2 0.3 0.4\" rgb2=\"0.1 0.2 0.3\"/>\n",
    );
    xml.push_str(
        "    <material name=\"grid_mat\" texture=\"grid\" texrepeat=\"8 8\" reflectance=\"0.2\"/>\n",
    );
    push_indented(&mut xml, &assets_xml, "    ");
    xml.push_str("  </asset>\n");

    xml.push_str("  <worldbody>\n");
    xml.push_str(&worldbody);
    xml.push_str("  </worldbody>\n");

    if !sensors_xml.is_empty() {
        xml.push_str("  <sensor>\n");
        push_indented(&mut xml, &sensors_xml, "    ");
        xml.push_str("  </sensor>\n");
    }

    xml.push_str("</mujoco>\n");

    Ok(CompiledScene {
        scene_name: scene.name.clone(),
        mjcf_xml: xml,
        cameras: scene.cameras.iter().map(|c| c.name.clone()).collect(),
        timestep: scene.physics.timestep,
        vehicle,
        instance_count,
    })
}

/// Write a compiled scene's MJCF to a file
pub fn write_scene_to_file(
    scene: &SceneSpec,
    catalog: &AssetCatalog,
    path: &Path,
    seed: u64,
) -> Result<()> {
    let xml = scene_to_mjcf(scene, catalog, seed)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, xml)?;
    Ok(())
}

/// Expand an ObjectSpec into concrete instances.
///
/// Explicit instances pass through; no placement at all means one instance
/// at the origin; layouts are expanded deterministically from the seed.
pub fn layout_instances(obj: &ObjectSpec, seed: u64) -> Vec<InstanceSpec> {
    if let Some(instances) = &obj.instances {
        return instances.clone();
    }

    let layout = match &obj.layout {
        Some(layout) => layout,
        None => {
            return vec![InstanceSpec {
                pose: Pose::at(0.0, 0.0, 0.0),
                name_suffix: None,
            }]
        }
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut instances = Vec::new();

    match layout {
        Layout::Grid(grid) => {
            for row in 0..grid.rows {
                for col in 0..grid.cols {
                    let x = grid.origin[0] + col as f64 * grid.spacing[0];
                    let y = grid.origin[1] + row as f64 * grid.spacing[1];
                    let z = grid.origin[2];

                    let yaw = if grid.yaw_variation_deg > 0.0 {
                        rng.gen_range(-grid.yaw_variation_deg..=grid.yaw_variation_deg)
                    } else {
                        0.0
                    };

                    instances.push(InstanceSpec {
                        pose: Pose {
                            position: [x, y, z],
                            yaw_deg: yaw,
                            pitch_deg: 0.0,
                            roll_deg: 0.0,
                        },
                        name_suffix: Some(format!("r{}_c{}", row, col)),
                    });
                }
            }
        }
        Layout::Random(random) => {
            let mut placed: Vec<(f64, f64)> = Vec::new();

            for i in 0..random.count {
                let max_attempts = 100;
                let mut candidate = (random.center[0], random.center[1]);

                for _ in 0..max_attempts {
                    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                    let r = rng.gen_range(0.0f64..1.0).sqrt() * random.radius;
                    let x = random.center[0] + r * angle.cos();
                    let y = random.center[1] + r * angle.sin();
                    candidate = (x, y);

                    if random.min_separation > 0.0 {
                        let too_close = placed.iter().any(|(px, py)| {
                            ((x - px).powi(2) + (y - py).powi(2)).sqrt() < random.min_separation
                        });
                        if too_close {
                            continue;
                        }
                    }
                    break;
                }

                placed.push(candidate);
                let yaw = if random.random_yaw {
                    rng.gen_range(0.0..360.0)
                } else {
                    0.0
                };

                instances.push(InstanceSpec {
                    pose: Pose {
                        position: [candidate.0, candidate.1, random.center[2]],
                        yaw_deg: yaw,
                        pitch_deg: 0.0,
                        roll_deg: 0.0,
                    },
                    name_suffix: Some(format!("{}", i)),
                });
            }
        }
    }

    instances
}

/// Euler angles of a pose as (roll, pitch, yaw) in degrees, the attribute
/// order MJCF expects
fn euler_deg(pose: &Pose) -> (f64, f64, f64) {
    (pose.roll_deg, pose.pitch_deg, pose.yaw_deg)
}

/// Euler angles to look from `position` toward `target`
fn look_at_euler(position: &[f64; 3], target: &[f64; 3]) -> (f64, f64, f64) {
    let dx = target[0] - position[0];
    let dy = target[1] - position[1];
    let dz = target[2] - position[2];

    let yaw = dy.atan2(dx).to_degrees();
    let horizontal = (dx * dx + dy * dy).sqrt();
    let pitch = -dz.atan2(horizontal).to_degrees();

    (0.0, pitch, yaw)
}

fn fmt_vec(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).to_string()
}

fn push_indented(out: &mut String, content: &str, indent: &str) {
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(indent);
        out.push_str(line.trim_start());
        out.push('\n');
    }
}

/// Sections extracted from an asset's MJCF fragment, names prefixed
struct AssetFragment {
    worldbody: String,
    assets: String,
    sensors: String,
}

/// Load an asset's MJCF file and extract its worldbody/asset/sensor content
/// with every name (and reference to one) prefixed for uniqueness.
fn load_asset_fragment(
    catalog: &AssetCatalog,
    asset_id: &str,
    prefix: &str,
) -> Result<AssetFragment> {
    let manifest = catalog
        .get(asset_id)
        .ok_or_else(|| NeosceneError::AssetNotFound {
            asset_id: asset_id.to_string(),
            suggestions: catalog.suggestions_for(asset_id),
        })?;
    let folder = catalog
        .get_path(asset_id)
        .ok_or_else(|| NeosceneError::SceneBuild {
            message: format!("asset '{}' has no folder path", asset_id),
            asset_id: Some(asset_id.to_string()),
        })?;

    let mjcf_path = folder.join(&manifest.mjcf_include);
    let content = std::fs::read_to_string(&mjcf_path).map_err(|e| NeosceneError::SceneBuild {
        message: format!("failed to read {}: {}", mjcf_path.display(), e),
        asset_id: Some(asset_id.to_string()),
    })?;

    // Strip XML comments before section extraction
    let comments = Regex::new(r"(?s)<!--.*?-->").unwrap();
    let content = comments.replace_all(&content, "").to_string();

    let worldbody = extract_section(&content, "worldbody");
    let assets = extract_section(&content, "asset");
    let sensors = extract_section(&content, "sensor");

    let names = collect_names(&[&worldbody, &assets, &sensors]);

    Ok(AssetFragment {
        worldbody: prefix_names(&worldbody, prefix, &names),
        assets: prefix_names(&assets, prefix, &names),
        sensors: prefix_names(&sensors, prefix, &names),
    })
}

/// Inner content of `<tag>...</tag>`, or the whole input when the file is a
/// bare fragment without a `<mujoco>` wrapper
fn extract_section(content: &str, tag: &str) -> String {
    let pattern = format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>");
    let re = Regex::new(&pattern).unwrap();
    if let Some(captures) = re.captures(content) {
        return captures[1].trim().to_string();
    }
    if tag == "worldbody" && !content.contains("<mujoco") {
        return content.trim().to_string();
    }
    String::new()
}

fn collect_names(sections: &[&str]) -> Vec<String> {
    let re = Regex::new(r#"name="([^"]+)""#).unwrap();
    let mut names = Vec::new();
    for section in sections {
        for captures in re.captures_iter(section) {
            names.push(captures[1].to_string());
        }
    }
    names
}

/// Prefix every defined name and every reference to one, so inlining the
/// same asset twice never collides
fn prefix_names(content: &str, prefix: &str, names: &[String]) -> String {
    if content.is_empty() {
        return String::new();
    }

    let re = Regex::new(
        r#"(name|site|material|mesh|texture|class|childclass|joint|body)="([^"]+)""#,
    )
    .unwrap();

    re.replace_all(content, |captures: &regex::Captures| {
        let attr = &captures[1];
        let value = &captures[2];
        if attr == "name" || names.iter().any(|n| n == value) {
            format!("{}=\"{}_{}\"", attr, prefix, value)
        } else {
            format!("{}=\"{}\"", attr, value)
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::catalog::tests::write_asset;
    use crate::scene::schema::{example_scene_spec, GridLayout, RandomLayout};

    fn fixture_catalog() -> (tempfile::TempDir, AssetCatalog) {
        let dir = tempfile::tempdir().unwrap();
        write_asset(
            dir.path(),
            "orchard",
            "Orchard",
            "environment",
            &["orchard"],
            "<mujoco><worldbody><geom name=\"ground\" type=\"plane\" size=\"50 50 0.1\" material=\"grass\"/></worldbody><asset><material name=\"grass\" rgba=\"0.2 0.5 0.2 1\"/></asset></mujoco>",
        );
        write_asset(
            dir.path(),
            "tractor_bluewhite",
            "Tractor",
            "vehicle",
            &["tractor"],
            "<mujoco><worldbody><body name=\"base\"><geom name=\"chassis\" type=\"box\" size=\"1 0.5 0.3\"/></body></worldbody></mujoco>",
        );
        write_asset(
            dir.path(),
            "crate_wooden_small",
            "Crate",
            "prop",
            &["crate"],
            "<mujoco><worldbody><geom name=\"crate\" type=\"box\" size=\"0.2 0.2 0.2\"/></worldbody></mujoco>",
        );
        let catalog = AssetCatalog::new(dir.path()).unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_compile_example_scene() {
        let (_dir, catalog) = fixture_catalog();
        let spec = example_scene_spec();
        let compiled = compile(&spec, &catalog, DEFAULT_SEED).unwrap();

        assert_eq!(compiled.scene_name, "orchard_demo");
        assert_eq!(compiled.cameras, vec!["overview_cam", "tractor_cam"]);
        assert_eq!(compiled.timestep, 0.002);
        assert_eq!(compiled.vehicle.as_deref(), Some("main_tractor_1"));
        // 1 tractor + 2x3 crate grid
        assert_eq!(compiled.instance_count, 7);

        let xml = &compiled.mjcf_xml;
        assert!(xml.starts_with("<mujoco model=\"orchard_demo\">"));
        assert!(xml.contains("<body name=\"env_orchard\""));
        assert!(xml.contains("<camera name=\"overview_cam\""));
        assert!(xml.contains("storage_crates_r1_c2"));
        // Asset-internal names got prefixed, references too
        assert!(xml.contains("name=\"env_orchard_ground\""));
        assert!(xml.contains("material=\"env_orchard_grass\""));
    }

    #[test]
    fn test_unknown_environment_asset() {
        let (_dir, catalog) = fixture_catalog();
        let mut spec = example_scene_spec();
        spec.environment.asset_id = "volcano".to_string();

        let err = compile(&spec, &catalog, DEFAULT_SEED).unwrap_err();
        assert!(matches!(err, NeosceneError::AssetNotFound { .. }));
    }

    #[test]
    fn test_grid_layout_expansion() {
        let obj = ObjectSpec {
            asset_id: "crate_wooden_small".to_string(),
            name: None,
            layout: Some(Layout::Grid(GridLayout {
                origin: [1.0, 2.0, 0.0],
                rows: 2,
                cols: 3,
                spacing: [0.5, 1.0],
                yaw_variation_deg: 0.0,
            })),
            instances: None,
        };
        let instances = layout_instances(&obj, DEFAULT_SEED);
        assert_eq!(instances.len(), 6);
        assert_eq!(instances[0].pose.position, [1.0, 2.0, 0.0]);
        // Row 1, col 2
        assert_eq!(instances[5].pose.position, [2.0, 3.0, 0.0]);
        assert_eq!(instances[5].name_suffix.as_deref(), Some("r1_c2"));
    }

    #[test]
    fn test_random_layout_respects_count_and_radius() {
        let obj = ObjectSpec {
            asset_id: "crate_wooden_small".to_string(),
            name: None,
            layout: Some(Layout::Random(RandomLayout {
                center: [10.0, 10.0, 0.5],
                radius: 5.0,
                count: 8,
                min_separation: 0.5,
                random_yaw: true,
            })),
            instances: None,
        };
        let instances = layout_instances(&obj, DEFAULT_SEED);
        assert_eq!(instances.len(), 8);
        for inst in &instances {
            let dx = inst.pose.position[0] - 10.0;
            let dy = inst.pose.position[1] - 10.0;
            assert!((dx * dx + dy * dy).sqrt() <= 5.0 + 1e-9);
            assert_eq!(inst.pose.position[2], 0.5);
        }
    }

    #[test]
    fn test_layouts_deterministic_under_seed() {
        let obj = ObjectSpec {
            asset_id: "crate_wooden_small".to_string(),
            name: None,
            layout: Some(Layout::Random(RandomLayout {
                center: [0.0, 0.0, 0.0],
                radius: 3.0,
                count: 4,
                min_separation: 0.0,
                random_yaw: true,
            })),
            instances: None,
        };
        let a = layout_instances(&obj, 7);
        let b = layout_instances(&obj, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_placement_yields_single_origin_instance() {
        let obj = ObjectSpec {
            asset_id: "crate_wooden_small".to_string(),
            name: None,
            layout: None,
            instances: None,
        };
        let instances = layout_instances(&obj, DEFAULT_SEED);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].pose.position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_look_at_euler_points_down() {
        let (roll, pitch, yaw) = look_at_euler(&[0.0, 0.0, 10.0], &[0.0, 10.0, 0.0]);
        assert_eq!(roll, 0.0);
        assert!((yaw - 90.0).abs() < 1e-9);
        assert!(pitch > 0.0);
    }

    #[test]
    fn test_missing_mjcf_file_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        write_asset(
            dir.path(),
            "orchard",
            "Orchard",
            "environment",
            &[],
            "<mujoco/>",
        );
        // Point the manifest at a file that does not exist
        let manifest_path = dir.path().join("orchard").join("manifest.json");
        let mut manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        manifest["mjcf_include"] = serde_json::json!("missing.xml");
        std::fs::write(&manifest_path, manifest.to_string()).unwrap();

        let catalog = AssetCatalog::new(dir.path()).unwrap();
        let mut spec = example_scene_spec();
        spec.objects.clear();
        spec.cameras.clear();

        let err = compile(&spec, &catalog, DEFAULT_SEED).unwrap_err();
        assert!(matches!(err, NeosceneError::SceneBuild { .. }));
    }
}
