//! Chat-turn orchestration over the session registry
//!
//! `SceneService` is what the transport layer talks to: it owns the scene
//! agent, the asset catalog, the physics backend, and the registry, and
//! implements the four logical operations (chat turn, read sensors, read
//! camera, set control).
//!
//! Scene replacement is transactional at session granularity: translate,
//! load, and spawn the new worker first; swap it in under the session lock;
//! only then tear the old worker down. Any failure before the swap leaves
//! the session's prior scene and worker untouched and still serving.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assets::AssetCatalog;
use crate::config::Config;
use crate::error::{NeosceneError, Result};
use crate::exporter;
use crate::llm::TextGenerator;
use crate::scene::agent::SceneAgent;
use crate::scene::schema::{SceneSpec, SceneSummary};
use crate::session::registry::SessionRegistry;
use crate::session::session::{MessageRole, Session};
use crate::sim::backend::{CameraFrame, SensorSnapshot, SimulationBackend};
use crate::sim::control::ControlCommand;
use crate::sim::worker::{SimWorker, WorkerConfig};
use crate::{info_log, warn_log};

/// Result of one chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub session_id: Uuid,
    pub is_new_session: bool,
    pub user_message: String,
    pub assistant_message: String,
    pub scene_summary: Option<SceneSummary>,
    pub scene_spec: Option<SceneSpec>,
}

pub struct SceneService {
    registry: Arc<SessionRegistry>,
    agent: SceneAgent,
    catalog: Arc<AssetCatalog>,
    backend: Arc<dyn SimulationBackend>,
    worker_config: WorkerConfig,
    layout_seed: u64,
}

impl SceneService {
    pub fn new(
        config: &Config,
        catalog: Arc<AssetCatalog>,
        llm: Arc<dyn TextGenerator>,
        backend: Arc<dyn SimulationBackend>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.session.history_limit));
        let agent = SceneAgent::new(catalog.clone(), llm, config.llm.max_repair_attempts);
        Self {
            registry,
            agent,
            catalog,
            backend,
            worker_config: WorkerConfig::from(&config.simulation),
            layout_seed: exporter::DEFAULT_SEED,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Spawn the idle-session eviction sweep per the config
    pub fn start_eviction(&self, config: &Config) -> CancellationToken {
        self.registry.start_eviction(
            Duration::from_secs(config.session.eviction_interval_secs.max(1)),
            Duration::from_secs(config.session.idle_timeout_secs.max(1)),
        )
    }

    /// One chat turn: create the session if needed, regenerate the scene,
    /// and reload the simulation.
    ///
    /// Generation or build failures are not fatal: they surface as an
    /// assistant-role error message while the session keeps its prior
    /// usable scene, per the polling-friendly error contract.
    pub async fn chat(&self, session_id: Option<Uuid>, message: &str) -> Result<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(NeosceneError::InvalidInput {
                message: "message cannot be empty".to_string(),
            });
        }

        let (session, is_new) = self.registry.get_or_create(session_id);
        session.touch();
        session.push_history(MessageRole::User, message);

        let preview: String = message.chars().take(100).collect();
        info_log!("[{}] Chat: '{}'", session.id(), preview);

        let prior = session.scene();
        let assistant_message = match self
            .agent
            .generate_and_repair(message, prior.as_ref())
            .await
        {
            Ok(spec) => match self.load_scene(&session, spec).await {
                Ok(summary) => {
                    info_log!("[{}] Loaded scene '{}'", session.id(), summary.scene_name);
                    format!(
                        "Updated scene '{}'. {} object(s), {} camera(s), environment: {}.",
                        summary.scene_name,
                        summary.object_count,
                        summary.camera_count,
                        summary.environment_asset_id
                    )
                }
                Err(e) => {
                    warn_log!("[{}] Scene load failed: {}", session.id(), e);
                    e.user_message()
                }
            },
            Err(e) => {
                warn_log!("[{}] Scene generation failed: {}", session.id(), e);
                e.user_message()
            }
        };

        session.push_history(MessageRole::Assistant, assistant_message.clone());

        Ok(ChatOutcome {
            session_id: session.id(),
            is_new_session: is_new,
            user_message: message.to_string(),
            assistant_message,
            scene_summary: session.summary(),
            scene_spec: session.scene(),
        })
    }

    /// Transactionally (re)load a scene into the session.
    ///
    /// Build -> load -> spawn -> swap -> tear down old. A failure in any
    /// step before the swap leaves the previous handle untouched; the old
    /// worker is only released after the new one is installed, and its
    /// shutdown waits for the in-flight tick.
    pub async fn load_scene(
        &self,
        session: &Arc<Session>,
        spec: SceneSpec,
    ) -> Result<SceneSummary> {
        let _guard = session.reload_lock.lock().await;

        let compiled = exporter::compile(&spec, &self.catalog, self.layout_seed)?;
        let instance = self.backend.load(&compiled)?;

        let worker = SimWorker::spawn(
            instance,
            compiled.cameras.clone(),
            session.pending_control(),
            self.worker_config.clone(),
        );

        let summary = spec.summary();
        let old = session.attach(spec, worker.clone());
        // A control landing between spawn and swap went to the old worker;
        // re-sync the slot so the new loop sees the latest command
        worker.set_control(session.pending_control());
        if let Some(old) = old {
            old.shutdown().await;
        }

        Ok(summary)
    }

    /// Latest sensor values. Unknown session is an error; a session with no
    /// simulation returns an empty snapshot.
    pub fn read_sensors(&self, session_id: Uuid) -> Result<SensorSnapshot> {
        let session = self.registry.get(session_id)?;
        session.touch();
        Ok(session.read_sensors())
    }

    /// Latest camera frame; `RenderUnavailable` for all the expected "no
    /// image right now" states.
    pub fn render_camera(&self, session_id: Uuid, camera: Option<&str>) -> Result<CameraFrame> {
        let session = self.registry.get(session_id)?;
        session.touch();
        session.render_camera(camera)
    }

    /// Overwrite the session's control slot (clamped). Rejected at the
    /// registry boundary for unknown sessions; always succeeds otherwise,
    /// even before a scene is loaded.
    pub fn set_control(
        &self,
        session_id: Uuid,
        throttle: f64,
        steering: f64,
    ) -> Result<ControlCommand> {
        let session = self.registry.get(session_id)?;
        session.touch();
        Ok(session.set_control(throttle, steering))
    }

    /// Tear down every session; used on server shutdown
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
