//! One scene editing session
//!
//! A session owns at most one stepping worker at a time. All mutable state
//! sits behind one short-held lock; sensor and camera reads only take the
//! lock long enough to clone the worker handle, then read its buffers
//! outside the lock. Scene (re)loads are serialized by a separate async
//! lock so two chat turns can never race a handle swap.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NeosceneError, Result};
use crate::scene::schema::{SceneSpec, SceneSummary};
use crate::sim::backend::{CameraFrame, SensorSnapshot};
use crate::sim::control::ControlCommand;
use crate::sim::worker::SimWorker;

/// Role of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Single entry in the session's rolling conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

struct SessionState {
    scene: Option<SceneSpec>,
    worker: Option<Arc<SimWorker>>,
    /// Stored even with no worker attached; seeded into the next one
    pending_control: ControlCommand,
    history: VecDeque<HistoryEntry>,
    last_active: DateTime<Utc>,
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    history_limit: usize,
    state: Mutex<SessionState>,
    /// Serializes scene (re)loads; never held across reads
    pub(crate) reload_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(id: Uuid, history_limit: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            history_limit,
            state: Mutex::new(SessionState {
                scene: None,
                worker: None,
                pending_control: ControlCommand::neutral(),
                history: VecDeque::new(),
                last_active: now,
            }),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().last_active
    }

    /// Mark the session as recently used
    pub fn touch(&self) {
        self.state.lock().last_active = Utc::now();
    }

    /// Append to the rolling history, dropping the oldest entry past the cap
    pub fn push_history(&self, role: MessageRole, text: impl Into<String>) {
        let mut state = self.state.lock();
        if state.history.len() >= self.history_limit {
            state.history.pop_front();
        }
        state.history.push_back(HistoryEntry {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn scene(&self) -> Option<SceneSpec> {
        self.state.lock().scene.clone()
    }

    pub fn summary(&self) -> Option<SceneSummary> {
        self.state.lock().scene.as_ref().map(|s| s.summary())
    }

    pub fn has_worker(&self) -> bool {
        self.state.lock().worker.is_some()
    }

    /// Clone the attached worker handle, if any
    pub fn worker(&self) -> Option<Arc<SimWorker>> {
        self.state.lock().worker.clone()
    }

    pub fn pending_control(&self) -> ControlCommand {
        self.state.lock().pending_control
    }

    /// Store a control command (clamped) and forward it to the attached
    /// worker. With no worker attached the command is kept and applied once
    /// a scene loads; control and scene-load requests may race.
    pub fn set_control(&self, throttle: f64, steering: f64) -> ControlCommand {
        let command = ControlCommand::new(throttle, steering);
        let worker = {
            let mut state = self.state.lock();
            state.pending_control = command;
            state.worker.clone()
        };
        if let Some(worker) = worker {
            worker.set_control(command);
        }
        command
    }

    /// Current sensor snapshot. No attached worker yields an empty snapshot,
    /// not an error: "no sensors available" is a normal state.
    pub fn read_sensors(&self) -> SensorSnapshot {
        match self.worker() {
            Some(worker) => worker.read_sensors(),
            None => SensorSnapshot::default(),
        }
    }

    /// Latest frame for the camera (default: first declared in the scene)
    pub fn render_camera(&self, camera: Option<&str>) -> Result<CameraFrame> {
        match self.worker() {
            Some(worker) => worker.frame(camera),
            None => Err(NeosceneError::RenderUnavailable {
                reason: "no simulation loaded".to_string(),
            }),
        }
    }

    /// Atomically install a fully constructed worker and scene, returning
    /// the previous worker for the caller to tear down. The swap itself
    /// never blocks on teardown.
    pub(crate) fn attach(&self, scene: SceneSpec, worker: Arc<SimWorker>) -> Option<Arc<SimWorker>> {
        let mut state = self.state.lock();
        state.scene = Some(scene);
        state.worker.replace(worker)
    }

    /// Remove and return the worker without touching the scene
    pub(crate) fn detach(&self) -> Option<Arc<SimWorker>> {
        self.state.lock().worker.take()
    }

    /// Stop the stepping loop (waiting for the in-flight tick) and release
    /// the backend instance
    pub async fn teardown(&self) {
        if let Some(worker) = self.detach() {
            worker.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), 3)
    }

    #[test]
    fn test_history_cap_drops_oldest() {
        let session = session();
        for i in 0..5 {
            session.push_history(MessageRole::User, format!("msg {}", i));
        }
        let history = session.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, "msg 2");
        assert_eq!(history[2].text, "msg 4");
    }

    #[test]
    fn test_control_stored_without_worker() {
        let session = session();
        assert!(!session.has_worker());

        let cmd = session.set_control(2.0, -0.5);
        assert_eq!(cmd.throttle, 1.0);
        assert_eq!(cmd.steering, -0.5);
        assert_eq!(session.pending_control().throttle, 1.0);
    }

    #[test]
    fn test_reads_without_worker() {
        let session = session();

        let snapshot = session.read_sensors();
        assert!(snapshot.values.is_empty());
        assert!(!snapshot.stale);

        let err = session.render_camera(None).unwrap_err();
        assert!(matches!(err, NeosceneError::RenderUnavailable { .. }));
    }

    #[test]
    fn test_touch_updates_last_active() {
        let session = session();
        let before = session.last_active();
        std::thread::sleep(std::time::Duration::from_millis(5));
        session.touch();
        assert!(session.last_active() > before);
    }
}
