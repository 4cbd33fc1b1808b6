//! Scene agent - converts natural language to SceneSpec
//!
//! Orchestrates the text generator: builds the prompt (asset catalog plus
//! schema summary, with the prior scene for incremental edits), extracts
//! JSON from the response, validates it, and retries with the validation
//! errors folded back into the prompt.

use std::sync::Arc;

use regex::Regex;

use crate::assets::AssetCatalog;
use crate::error::{NeosceneError, Result};
use crate::llm::{GenerateOptions, TextGenerator};
use crate::scene::schema::SceneSpec;
use crate::{info_log, warn_log};

const SCHEMA_SUMMARY: &str = r#"## SceneSpec JSON Schema

```json
{
  "name": "string (required) - unique scene name",
  "description": "string (optional) - human description",
  "environment": {
    "asset_id": "string (required) - must be from Available Assets",
    "gravity": [0.0, 0.0, -9.81] (optional)
  },
  "objects": [
    {
      "asset_id": "string (required) - must be from Available Assets",
      "name": "string (optional) - display name",
      "instances": [
        {"pose": {"position": [x, y, z], "yaw_deg": 0.0, "pitch_deg": 0.0, "roll_deg": 0.0}}
      ]
      // OR use layout instead of instances:
      "layout": {"type": "grid", "origin": [x, y, z], "rows": int, "cols": int, "spacing": [dx, dy]}
      // OR:
      "layout": {"type": "random", "center": [x, y, z], "radius": float, "count": int, "min_separation": float}
    }
  ],
  "cameras": [
    {
      "name": "string (required)",
      "pose": {"position": [x, y, z], "yaw_deg": 0.0, "pitch_deg": 0.0},
      "target": [x, y, z] (optional - look-at point),
      "fovy": 45.0 (optional)
    }
  ],
  "lights": [
    {"name": "string", "type": "directional" | "point" | "spot", "position": [x, y, z], "direction": [dx, dy, dz], "diffuse": [r, g, b]}
  ],
  "physics": {"timestep": 0.002, "solver": "Newton"}
}
```

### Important Rules:
1. All asset_id values MUST exactly match an ID from Available Assets
2. Position coordinates are in meters (x=right, y=forward, z=up)
3. For multiple objects, use either `instances` OR `layout`, not both
4. For grid layout: total objects = rows x cols
5. Environment is required, objects/cameras/lights are optional
"#;

/// Validation failure carrying the raw text needed for a repair round
struct ValidationFailure {
    errors: Vec<String>,
    raw: String,
}

impl ValidationFailure {
    fn into_error(self, message: &str) -> NeosceneError {
        NeosceneError::SceneValidation {
            message: message.to_string(),
            errors: self.errors,
            raw_preview: Some(truncate(&self.raw, 500)),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

/// Extract JSON from a response that might include markdown fences
fn extract_json(response: &str) -> Option<String> {
    let fenced = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap();
    if let Some(captures) = fenced.captures(response) {
        return Some(captures[1].trim().to_string());
    }

    let bare = Regex::new(r"(?s)\{.*\}").unwrap();
    if let Some(found) = bare.find(response) {
        return Some(found.as_str().trim().to_string());
    }

    let stripped = response.trim();
    if stripped.starts_with('{') && stripped.ends_with('}') {
        return Some(stripped.to_string());
    }

    None
}

/// Agent that converts natural language prompts to validated SceneSpecs
pub struct SceneAgent {
    catalog: Arc<AssetCatalog>,
    llm: Arc<dyn TextGenerator>,
    max_repair_attempts: usize,
    asset_summary: String,
}

impl SceneAgent {
    pub fn new(
        catalog: Arc<AssetCatalog>,
        llm: Arc<dyn TextGenerator>,
        max_repair_attempts: usize,
    ) -> Self {
        let asset_summary = catalog.for_llm_prompt();
        info_log!("SceneAgent initialized with {} assets", catalog.len());
        Self {
            catalog,
            llm,
            max_repair_attempts,
            asset_summary,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are a scene generation assistant for physics simulations.
Your task is to convert natural language scene descriptions into valid JSON
that conforms to the SceneSpec schema.

{}

{}

## Instructions:
1. Read the user's scene description carefully
2. Choose appropriate assets from the Available Assets list
3. Position objects logically in 3D space (z=0 is ground level)
4. Use layouts (grid/random) for multiple similar objects
5. Add at least one camera to observe the scene
6. Return ONLY valid JSON, no explanations or markdown
"#,
            self.asset_summary, SCHEMA_SUMMARY
        )
    }

    fn user_prompt(&self, user_prompt: &str, previous_scene: Option<&SceneSpec>) -> String {
        match previous_scene {
            None => format!(
                r#"Create a SceneSpec JSON for this scene:

"{}"

Remember:
- Use ONLY asset_id values from the Available Assets list
- Position objects logically (z=0 is ground, positive z is up)
- Include at least one camera
- Return ONLY the JSON object, no markdown or explanations"#,
                user_prompt
            ),
            Some(prev) => {
                let prev_json =
                    serde_json::to_string_pretty(prev).unwrap_or_else(|_| "{}".to_string());
                format!(
                    r#"Here is the CURRENT scene:

```json
{}
```

The user wants to MODIFY this scene with the following request:

"{}"

Instructions:
- Start from the current scene and apply the user's modifications
- Keep existing objects/cameras unless the user asks to remove them
- Use ONLY asset_id values from the Available Assets list
- Return the COMPLETE modified scene as JSON (not just the changes)
- Return ONLY the JSON object, no markdown or explanations"#,
                    prev_json, user_prompt
                )
            }
        }
    }

    fn parse_and_validate(
        &self,
        raw_response: &str,
    ) -> std::result::Result<SceneSpec, ValidationFailure> {
        let json_str = match extract_json(raw_response) {
            Some(s) => s,
            None => {
                warn_log!("Could not extract JSON from LLM response");
                return Err(ValidationFailure {
                    errors: vec!["No valid JSON found in response".to_string()],
                    raw: raw_response.to_string(),
                });
            }
        };

        let data: serde_json::Value = match serde_json::from_str(&json_str) {
            Ok(v) => v,
            Err(e) => {
                warn_log!("Invalid JSON: {}", e);
                return Err(ValidationFailure {
                    errors: vec![format!("Invalid JSON: {}", e)],
                    raw: json_str,
                });
            }
        };

        let spec: SceneSpec = match serde_json::from_value(data) {
            Ok(s) => s,
            Err(e) => {
                warn_log!("Schema validation failed: {}", e);
                return Err(ValidationFailure {
                    errors: vec![format!("Schema: {}", e)],
                    raw: json_str,
                });
            }
        };

        let mut errors = spec.validation_errors();
        errors.extend(self.validate_asset_references(&spec));
        if !errors.is_empty() {
            warn_log!("Scene validation failed: {} errors", errors.len());
            return Err(ValidationFailure {
                errors,
                raw: json_str,
            });
        }

        Ok(spec)
    }

    /// Check that every asset_id the scene references exists in the catalog
    fn validate_asset_references(&self, spec: &SceneSpec) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.catalog.contains(&spec.environment.asset_id) {
            let available: Vec<String> = self
                .catalog
                .list(Some(crate::assets::AssetCategory::Environment))
                .iter()
                .map(|a| a.asset_id.clone())
                .collect();
            errors.push(format!(
                "Environment asset_id '{}' not found. Available: {:?}",
                spec.environment.asset_id, available
            ));
        }

        for obj in &spec.objects {
            if !self.catalog.contains(&obj.asset_id) {
                let similar = self.catalog.suggestions_for(&obj.asset_id);
                errors.push(format!(
                    "Object asset_id '{}' not found. Similar: {}",
                    obj.asset_id,
                    if similar.is_empty() {
                        "none".to_string()
                    } else {
                        similar.join(", ")
                    }
                ));
            }
        }

        for cam in &spec.cameras {
            if let Some(asset_id) = &cam.asset_id {
                if !self.catalog.contains(asset_id) {
                    errors.push(format!("Camera asset_id '{}' not found", asset_id));
                }
            }
        }

        errors
    }

    /// Single generation pass without repair
    pub async fn generate_scene_spec(
        &self,
        user_prompt: &str,
        previous_scene: Option<&SceneSpec>,
    ) -> Result<SceneSpec> {
        if previous_scene.is_some() {
            info_log!("Updating scene with: '{}'", truncate(user_prompt, 100));
        } else {
            info_log!(
                "Generating scene for prompt: '{}'",
                truncate(user_prompt, 100)
            );
        }

        let full_prompt = format!(
            "{}\n\n---\n\n{}",
            self.system_prompt(),
            self.user_prompt(user_prompt, previous_scene)
        );

        let raw_response = self
            .llm
            .generate(
                &full_prompt,
                GenerateOptions {
                    temperature: Some(0.3),
                    json_output: true,
                },
            )
            .await?;

        let spec = self
            .parse_and_validate(&raw_response)
            .map_err(|f| f.into_error("Generated scene failed validation"))?;

        info_log!(
            "Generated scene: name='{}', env='{}', objects={}, cameras={}",
            spec.name,
            spec.environment.asset_id,
            spec.objects.len(),
            spec.cameras.len()
        );

        Ok(spec)
    }

    /// Generate with automatic repair: on validation failure, feed the
    /// invalid JSON and error list back to the generator, up to
    /// `max_repair_attempts` extra rounds.
    pub async fn generate_and_repair(
        &self,
        user_prompt: &str,
        previous_scene: Option<&SceneSpec>,
    ) -> Result<SceneSpec> {
        let full_prompt = format!(
            "{}\n\n---\n\n{}",
            self.system_prompt(),
            self.user_prompt(user_prompt, previous_scene)
        );

        let raw_response = self
            .llm
            .generate(
                &full_prompt,
                GenerateOptions {
                    temperature: Some(0.3),
                    json_output: true,
                },
            )
            .await?;

        let mut failure = match self.parse_and_validate(&raw_response) {
            Ok(spec) => return Ok(spec),
            Err(f) => f,
        };

        for attempt in 1..=self.max_repair_attempts {
            info_log!("Repair attempt {}/{}", attempt, self.max_repair_attempts);

            let repair_prompt = format!(
                r#"{}

---

The previous attempt to generate a scene for "{}" produced invalid JSON.

## Invalid JSON:
```json
{}
```

## Validation Errors:
{}

## Instructions:
Fix the JSON to resolve all validation errors. Return ONLY the corrected JSON, no explanations.
Remember to use ONLY asset_id values from the Available Assets list."#,
                self.system_prompt(),
                user_prompt,
                failure.raw,
                failure
                    .errors
                    .iter()
                    .map(|e| format!("- {}", e))
                    .collect::<Vec<_>>()
                    .join("\n")
            );

            let raw_response = self
                .llm
                .generate(
                    &repair_prompt,
                    GenerateOptions {
                        temperature: Some(0.2),
                        json_output: true,
                    },
                )
                .await?;

            match self.parse_and_validate(&raw_response) {
                Ok(spec) => return Ok(spec),
                Err(f) => failure = f,
            }
        }

        warn_log!(
            "Scene generation failed after {} attempts",
            self.max_repair_attempts + 1
        );
        Err(failure.into_error(&format!(
            "Failed to generate valid scene after {} attempts",
            self.max_repair_attempts + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::catalog::tests::write_asset;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator returning scripted responses in order
    struct ScriptedGenerator {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .get(i)
                .cloned()
                .unwrap_or_else(|| self.responses.last().cloned().unwrap_or_default()))
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn provider_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn fixture_catalog() -> (tempfile::TempDir, Arc<AssetCatalog>) {
        let dir = tempfile::tempdir().unwrap();
        write_asset(
            dir.path(),
            "orchard",
            "Orchard",
            "environment",
            &["orchard"],
            "<mujoco><worldbody><geom name=\"ground\" type=\"plane\" size=\"50 50 0.1\"/></worldbody></mujoco>",
        );
        write_asset(
            dir.path(),
            "tractor_bluewhite",
            "Tractor",
            "vehicle",
            &["tractor"],
            "<mujoco><worldbody><body name=\"base\"><geom name=\"chassis\" type=\"box\" size=\"1 0.5 0.3\"/></body></worldbody></mujoco>",
        );
        let catalog = Arc::new(AssetCatalog::new(dir.path()).unwrap());
        (dir, catalog)
    }

    const GOOD_SCENE: &str = r#"{
        "name": "orchard_scene",
        "environment": {"asset_id": "orchard"},
        "objects": [{"asset_id": "tractor_bluewhite"}],
        "cameras": [{"name": "cam", "pose": {"position": [0, 0, 10]}}]
    }"#;

    #[test]
    fn test_extract_json_variants() {
        let fenced = format!("Here you go:\n```json\n{}\n```\nDone.", GOOD_SCENE);
        assert!(extract_json(&fenced).unwrap().starts_with('{'));

        let unfenced = format!("```\n{}\n```", GOOD_SCENE);
        assert!(extract_json(&unfenced).is_some());

        let noisy = format!("Sure! {} hope that helps", GOOD_SCENE);
        assert!(extract_json(&noisy).unwrap().ends_with('}'));

        assert!(extract_json("no json here at all").is_none());
    }

    #[tokio::test]
    async fn test_generate_valid_scene() {
        let (_dir, catalog) = fixture_catalog();
        let llm = Arc::new(ScriptedGenerator::new(vec![GOOD_SCENE]));
        let agent = SceneAgent::new(catalog, llm.clone(), 2);

        let spec = agent
            .generate_and_repair("an orchard with a tractor", None)
            .await
            .unwrap();
        assert_eq!(spec.name, "orchard_scene");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_asset_fails_validation() {
        let (_dir, catalog) = fixture_catalog();
        let bad = r#"{"name": "s", "environment": {"asset_id": "moon_base"}}"#;
        let llm = Arc::new(ScriptedGenerator::new(vec![bad]));
        let agent = SceneAgent::new(catalog, llm, 0);

        let err = agent.generate_and_repair("a moon base", None).await.unwrap_err();
        match err {
            NeosceneError::SceneValidation { errors, .. } => {
                assert!(errors.iter().any(|e| e.contains("moon_base")));
            }
            other => panic!("expected SceneValidation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repair_loop_recovers() {
        let (_dir, catalog) = fixture_catalog();
        let llm = Arc::new(ScriptedGenerator::new(vec!["this is not json", GOOD_SCENE]));
        let agent = SceneAgent::new(catalog, llm.clone(), 2);

        let spec = agent.generate_and_repair("an orchard", None).await.unwrap();
        assert_eq!(spec.name, "orchard_scene");
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_repair_attempts_bounded() {
        let (_dir, catalog) = fixture_catalog();
        let llm = Arc::new(ScriptedGenerator::new(vec!["garbage"]));
        let agent = SceneAgent::new(catalog, llm.clone(), 2);

        let err = agent.generate_and_repair("anything", None).await.unwrap_err();
        assert!(matches!(err, NeosceneError::SceneValidation { .. }));
        // 1 initial + 2 repairs
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_prior_scene_included_in_prompt() {
        let (_dir, catalog) = fixture_catalog();
        let llm = Arc::new(ScriptedGenerator::new(vec![GOOD_SCENE]));
        let agent = SceneAgent::new(catalog, llm, 2);

        let prior: SceneSpec = serde_json::from_str(GOOD_SCENE).unwrap();
        let prompt = agent.user_prompt("add a crate", Some(&prior));
        assert!(prompt.contains("CURRENT scene"));
        assert!(prompt.contains("orchard_scene"));
    }
}
