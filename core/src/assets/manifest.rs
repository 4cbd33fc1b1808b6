//! Asset manifest model
//!
//! The manifest is the single source of truth for asset semantics. All
//! category/tag/fallback information lives here, one `manifest.json` per
//! asset folder.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NeosceneError, Result};

/// Standardized asset categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    /// Terrain, ground, world backgrounds
    Environment,
    /// Tractors, cars, trucks, robots with wheels
    Vehicle,
    /// Trees, rocks, grass, bushes, vegetation
    Nature,
    /// Buildings, roads, street lights, signs
    Urban,
    /// Cameras, IMUs, LiDARs, GPS
    Sensor,
    /// Humans, pedestrians
    Person,
    /// Birds, dogs, farm animals
    Animal,
    /// Crates, barrels, cones, tools
    Prop,
    /// Legacy alias for vehicle
    Robot,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Environment => "environment",
            AssetCategory::Vehicle => "vehicle",
            AssetCategory::Nature => "nature",
            AssetCategory::Urban => "urban",
            AssetCategory::Sensor => "sensor",
            AssetCategory::Person => "person",
            AssetCategory::Animal => "animal",
            AssetCategory::Prop => "prop",
            AssetCategory::Robot => "robot",
        }
    }

    /// Whether this category describes a drivable agent
    pub fn is_drivable(&self) -> bool {
        matches!(self, AssetCategory::Vehicle | AssetCategory::Robot)
    }
}

impl std::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "environment" => Ok(AssetCategory::Environment),
            "vehicle" => Ok(AssetCategory::Vehicle),
            "nature" => Ok(AssetCategory::Nature),
            "urban" => Ok(AssetCategory::Urban),
            "sensor" => Ok(AssetCategory::Sensor),
            "person" => Ok(AssetCategory::Person),
            "animal" => Ok(AssetCategory::Animal),
            "prop" => Ok(AssetCategory::Prop),
            "robot" => Ok(AssetCategory::Robot),
            _ => Err(format!("unknown asset category: {}", s)),
        }
    }
}

/// Manifest describing an asset's properties and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetManifest {
    pub asset_id: String,
    pub name: String,
    pub category: AssetCategory,

    /// Words/concepts this asset matches, used for fuzzy lookup and for
    /// the LLM asset listing
    #[serde(default)]
    pub tags: Vec<String>,

    /// Concepts this asset can substitute for if the primary is unavailable
    #[serde(default)]
    pub fallback_for: Vec<String>,

    /// For category=sensor: camera, imu, lidar, gps, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,

    /// Relative path (within the asset folder) to the MJCF XML fragment
    pub mjcf_include: String,

    /// [x, y, z] extent in meters, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_size: Option<Vec<f64>>,
}

impl AssetManifest {
    /// Compact one-line summary for LLM prompts
    pub fn llm_summary(&self) -> String {
        let mut line = format!("- `{}`: {}", self.asset_id, self.name);
        if !self.tags.is_empty() {
            let tags = self.tags[..self.tags.len().min(5)].join(", ");
            line.push_str(&format!(" (tags: {})", tags));
        }
        line
    }
}

/// Load and validate an asset manifest from a JSON file
pub fn load_manifest(path: &Path) -> Result<AssetManifest> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| NeosceneError::Json(format!(
        "{}: {}",
        path.display(),
        e
    )))
}

/// Discover all manifest.json files under the assets directory
pub fn discover_manifests(assets_dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/**/manifest.json", assets_dir.display());
    glob::glob(&pattern)
        .map(|paths| paths.filter_map(|p| p.ok()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_deserializes_with_defaults() {
        let json = r#"{
            "asset_id": "crate_wooden_small",
            "name": "Small Wooden Crate",
            "category": "prop",
            "mjcf_include": "crate.xml"
        }"#;
        let manifest: AssetManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.asset_id, "crate_wooden_small");
        assert_eq!(manifest.category, AssetCategory::Prop);
        assert!(manifest.tags.is_empty());
        assert!(manifest.sensor_type.is_none());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(
            "vehicle".parse::<AssetCategory>().unwrap(),
            AssetCategory::Vehicle
        );
        assert!(AssetCategory::Robot.is_drivable());
        assert!(!AssetCategory::Prop.is_drivable());
        assert!("spaceship".parse::<AssetCategory>().is_err());
    }

    #[test]
    fn test_llm_summary_truncates_tags() {
        let manifest = AssetManifest {
            asset_id: "tree_oak".to_string(),
            name: "Oak Tree".to_string(),
            category: AssetCategory::Nature,
            tags: vec![
                "tree".into(),
                "oak".into(),
                "plant".into(),
                "tall".into(),
                "wood".into(),
                "leafy".into(),
            ],
            fallback_for: vec![],
            sensor_type: None,
            mjcf_include: "tree.xml".to_string(),
            physical_size: None,
        };
        let summary = manifest.llm_summary();
        assert!(summary.contains("`tree_oak`"));
        assert!(summary.contains("wood"));
        assert!(!summary.contains("leafy"));
    }
}
