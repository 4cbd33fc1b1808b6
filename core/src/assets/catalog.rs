//! Asset catalog - the runtime index over asset manifests
//!
//! Scans an assets directory, loads every manifest, and provides id lookup,
//! category filtering, fuzzy matching, and the grouped listing injected into
//! LLM prompts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::assets::manifest::{discover_manifests, load_manifest, AssetCategory, AssetManifest};
use crate::error::Result;
use crate::{info_log, warn_log};

pub struct AssetCatalog {
    root_dir: PathBuf,
    by_id: HashMap<String, AssetManifest>,
    paths: HashMap<String, PathBuf>,
    by_category: BTreeMap<AssetCategory, Vec<String>>,
}

impl AssetCatalog {
    /// Scan the assets directory and index every manifest found.
    ///
    /// A missing directory yields an empty catalog rather than an error;
    /// "no assets installed" is a normal state for offline tooling.
    pub fn new(root_dir: &Path) -> Result<Self> {
        let mut catalog = AssetCatalog {
            root_dir: root_dir.to_path_buf(),
            by_id: HashMap::new(),
            paths: HashMap::new(),
            by_category: BTreeMap::new(),
        };

        if !root_dir.exists() {
            warn_log!("Assets directory not found: {}", root_dir.display());
            return Ok(catalog);
        }

        for manifest_path in discover_manifests(root_dir) {
            match load_manifest(&manifest_path) {
                Ok(manifest) => {
                    let folder = manifest_path
                        .parent()
                        .unwrap_or(root_dir)
                        .to_path_buf();
                    if catalog.by_id.contains_key(&manifest.asset_id) {
                        warn_log!(
                            "Duplicate asset_id '{}' at {}, keeping first",
                            manifest.asset_id,
                            manifest_path.display()
                        );
                        continue;
                    }
                    catalog
                        .by_category
                        .entry(manifest.category)
                        .or_default()
                        .push(manifest.asset_id.clone());
                    catalog.paths.insert(manifest.asset_id.clone(), folder);
                    catalog.by_id.insert(manifest.asset_id.clone(), manifest);
                }
                Err(e) => {
                    warn_log!("Skipping invalid manifest {}: {}", manifest_path.display(), e);
                }
            }
        }

        for ids in catalog.by_category.values_mut() {
            ids.sort();
        }

        info_log!(
            "Asset catalog loaded: {} assets from {}",
            catalog.by_id.len(),
            root_dir.display()
        );
        Ok(catalog)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.by_id.contains_key(asset_id)
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetManifest> {
        self.by_id.get(asset_id)
    }

    /// Folder containing the asset's manifest and MJCF fragment
    pub fn get_path(&self, asset_id: &str) -> Option<&Path> {
        self.paths.get(asset_id).map(|p| p.as_path())
    }

    /// All assets, optionally filtered by category, sorted by id
    pub fn list(&self, category: Option<AssetCategory>) -> Vec<&AssetManifest> {
        match category {
            Some(cat) => self
                .by_category
                .get(&cat)
                .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
                .unwrap_or_default(),
            None => {
                let mut all: Vec<&AssetManifest> = self.by_id.values().collect();
                all.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
                all
            }
        }
    }

    /// Find the best asset matching a free-text concept.
    ///
    /// Scoring: exact id > id/name substring > tag hit > fallback_for hit.
    pub fn best_match(&self, text: &str, category: Option<AssetCategory>) -> Option<&AssetManifest> {
        let needle = text.to_lowercase();
        self.list(category)
            .into_iter()
            .map(|m| (Self::match_score(m, &needle), m))
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, m)| (*score, std::cmp::Reverse(m.asset_id.clone())))
            .map(|(_, m)| m)
    }

    fn match_score(manifest: &AssetManifest, needle: &str) -> u32 {
        let id = manifest.asset_id.to_lowercase();
        let name = manifest.name.to_lowercase();

        if id == needle {
            return 100;
        }
        let mut score = 0;
        if id.contains(needle) || needle.contains(&id) {
            score = score.max(60);
        }
        if name.contains(needle) {
            score = score.max(50);
        }
        if manifest
            .tags
            .iter()
            .any(|t| t.to_lowercase() == *needle)
        {
            score = score.max(40);
        }
        if manifest
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(needle))
        {
            score = score.max(25);
        }
        if manifest
            .fallback_for
            .iter()
            .any(|f| f.to_lowercase() == *needle)
        {
            score = score.max(15);
        }
        score
    }

    /// Asset ids that look similar to an unknown id, for error messages
    pub fn suggestions_for(&self, asset_id: &str) -> Vec<String> {
        let needle = asset_id.to_lowercase();
        let mut matches: Vec<String> = self
            .by_id
            .keys()
            .filter(|id| {
                let id_lower = id.to_lowercase();
                id_lower.contains(&needle) || needle.contains(&id_lower)
            })
            .cloned()
            .collect();
        matches.sort();
        matches
    }

    /// Grouped asset listing for the LLM system prompt
    pub fn for_llm_prompt(&self) -> String {
        let mut lines = vec!["## Available Assets".to_string(), String::new()];

        for (category, ids) in &self.by_category {
            if ids.is_empty() {
                continue;
            }
            lines.push(format!("### {}s", capitalize(category.as_str())));
            for id in ids {
                if let Some(manifest) = self.by_id.get(id) {
                    lines.push(manifest.llm_summary());
                }
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn write_asset(
        root: &Path,
        asset_id: &str,
        name: &str,
        category: &str,
        tags: &[&str],
        mjcf: &str,
    ) {
        let dir = root.join(asset_id);
        fs::create_dir_all(&dir).unwrap();
        let manifest = serde_json::json!({
            "asset_id": asset_id,
            "name": name,
            "category": category,
            "tags": tags,
            "mjcf_include": "model.xml",
        });
        fs::write(
            dir.join("manifest.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        fs::write(dir.join("model.xml"), mjcf).unwrap();
    }

    fn fixture_catalog() -> (tempfile::TempDir, AssetCatalog) {
        let dir = tempfile::tempdir().unwrap();
        write_asset(
            dir.path(),
            "orchard",
            "Orchard",
            "environment",
            &["orchard", "farm", "trees"],
            "<mujoco><worldbody><geom name=\"ground\" type=\"plane\" size=\"50 50 0.1\"/></worldbody></mujoco>",
        );
        write_asset(
            dir.path(),
            "tractor_bluewhite",
            "Blue & White Tractor",
            "vehicle",
            &["tractor", "vehicle", "farm"],
            "<mujoco><worldbody><body name=\"tractor_base\"><geom name=\"chassis\" type=\"box\" size=\"1 0.5 0.3\"/></body></worldbody></mujoco>",
        );
        write_asset(
            dir.path(),
            "crate_wooden_small",
            "Small Wooden Crate",
            "prop",
            &["crate", "box", "wooden"],
            "<mujoco><worldbody><geom name=\"crate\" type=\"box\" size=\"0.2 0.2 0.2\"/></worldbody></mujoco>",
        );
        let catalog = AssetCatalog::new(dir.path()).unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_scan_and_lookup() {
        let (_dir, catalog) = fixture_catalog();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("orchard"));
        assert_eq!(
            catalog.get("tractor_bluewhite").unwrap().category,
            AssetCategory::Vehicle
        );
        assert!(catalog.get_path("crate_wooden_small").is_some());
    }

    #[test]
    fn test_missing_directory_yields_empty_catalog() {
        let catalog = AssetCatalog::new(Path::new("/nonexistent/assets/dir")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_category_filter() {
        let (_dir, catalog) = fixture_catalog();
        let environments = catalog.list(Some(AssetCategory::Environment));
        assert_eq!(environments.len(), 1);
        assert_eq!(environments[0].asset_id, "orchard");
        assert!(catalog.list(Some(AssetCategory::Animal)).is_empty());
    }

    #[test]
    fn test_best_match() {
        let (_dir, catalog) = fixture_catalog();
        let hit = catalog.best_match("tractor", None).unwrap();
        assert_eq!(hit.asset_id, "tractor_bluewhite");

        let hit = catalog
            .best_match("crate", Some(AssetCategory::Prop))
            .unwrap();
        assert_eq!(hit.asset_id, "crate_wooden_small");

        assert!(catalog.best_match("submarine", None).is_none());
    }

    #[test]
    fn test_suggestions() {
        let (_dir, catalog) = fixture_catalog();
        let suggestions = catalog.suggestions_for("tractor_bluewhite_v2");
        assert_eq!(suggestions, vec!["tractor_bluewhite".to_string()]);
    }

    #[test]
    fn test_llm_prompt_grouping() {
        let (_dir, catalog) = fixture_catalog();
        let prompt = catalog.for_llm_prompt();
        assert!(prompt.contains("### Environments"));
        assert!(prompt.contains("### Vehicles"));
        assert!(prompt.contains("`crate_wooden_small`"));
    }
}
