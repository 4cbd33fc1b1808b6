//! Per-session stepping worker
//!
//! One background task drives one loaded backend instance forward at a
//! fixed cadence, applying the latest control each tick and refreshing the
//! shared sensor snapshot and camera frame buffers. The instance is owned
//! by the task; readers only ever touch the buffers, so a slow render or a
//! slow reader never blocks stepping.
//!
//! Teardown is synchronous from the caller's perspective: `shutdown` cancels
//! the loop and joins the task, so no tick can execute against a released
//! backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SimulationSection;
use crate::error::{NeosceneError, Result};
use crate::sim::backend::{BackendInstance, CameraFrame, SensorSnapshot};
use crate::sim::control::ControlCommand;
use crate::{error_log, info_log, warn_log};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Camera frames are refreshed every N ticks
    pub render_every_ticks: u64,
    /// Floor for the tick period, whatever the scene timestep says
    pub min_tick_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            render_every_ticks: 10,
            min_tick_interval: Duration::from_millis(1),
        }
    }
}

impl From<&SimulationSection> for WorkerConfig {
    fn from(section: &SimulationSection) -> Self {
        Self {
            render_every_ticks: section.render_every_ticks.max(1),
            min_tick_interval: Duration::from_millis(section.min_tick_interval_ms.max(1)),
        }
    }
}

/// State shared between the stepping task and readers
struct WorkerShared {
    /// Latest control, overwrite semantics; consumed at each tick
    control: Mutex<ControlCommand>,
    /// Last good sensor snapshot
    snapshot: RwLock<SensorSnapshot>,
    /// Last rendered frame per camera
    frames: RwLock<HashMap<String, CameraFrame>>,
    degraded: AtomicBool,
    ticks: AtomicU64,
    /// Camera names in declaration order; first is the default
    cameras: Vec<String>,
}

/// Handle to one running stepping loop
pub struct SimWorker {
    shared: Arc<WorkerShared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimWorker {
    /// Spawn a stepping loop that takes ownership of the instance.
    ///
    /// The snapshot is pre-populated from the instance, so sensor reads
    /// immediately after load already see the declared channels.
    pub fn spawn(
        mut instance: Box<dyn BackendInstance>,
        cameras: Vec<String>,
        initial_control: ControlCommand,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let period = Duration::from_secs_f64(instance.timestep().max(1e-6))
            .max(config.min_tick_interval);
        let render_every = config.render_every_ticks.max(1);

        let shared = Arc::new(WorkerShared {
            control: Mutex::new(initial_control),
            snapshot: RwLock::new(SensorSnapshot {
                values: instance.read_sensors(),
                sim_time: instance.sim_time(),
                stale: false,
            }),
            frames: RwLock::new(HashMap::new()),
            degraded: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            cameras,
        });

        let cancel = CancellationToken::new();
        let loop_shared = shared.clone();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let control = *loop_shared.control.lock();
                instance.apply_control(control);

                if let Err(e) = instance.step() {
                    error_log!("Simulation step failed, degrading worker: {}", e);
                    loop_shared.degraded.store(true, Ordering::SeqCst);
                    loop_shared.snapshot.write().stale = true;
                    break;
                }

                let tick = loop_shared.ticks.fetch_add(1, Ordering::Relaxed) + 1;

                *loop_shared.snapshot.write() = SensorSnapshot {
                    values: instance.read_sensors(),
                    sim_time: instance.sim_time(),
                    stale: false,
                };

                if tick % render_every == 0 {
                    for camera in &loop_shared.cameras {
                        match instance.render(camera, tick) {
                            Ok(frame) => {
                                loop_shared.frames.write().insert(camera.clone(), frame);
                            }
                            Err(e) => {
                                warn_log!("Render failed for camera '{}': {}", camera, e);
                            }
                        }
                    }
                }
            }

            // Instance dropped here: backend resources released on the loop
            // task, never from a reader thread
            drop(instance);
        });

        info_log!(
            "Stepping worker started: period={:?}, render_every={} ticks, cameras={}",
            period,
            render_every,
            shared.cameras.len()
        );

        Arc::new(Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Replace the control slot. Last writer wins; a burst of commands
    /// between two ticks collapses to the final one.
    pub fn set_control(&self, control: ControlCommand) {
        *self.shared.control.lock() = control;
    }

    pub fn latest_control(&self) -> ControlCommand {
        *self.shared.control.lock()
    }

    /// Clone the current sensor snapshot. Degraded workers keep serving the
    /// last good values, tagged stale.
    pub fn read_sensors(&self) -> SensorSnapshot {
        let mut snapshot = self.shared.snapshot.read().clone();
        if self.is_degraded() {
            snapshot.stale = true;
        }
        snapshot
    }

    /// Latest frame for the camera, or the default (first declared) camera
    /// when none is named.
    pub fn frame(&self, camera: Option<&str>) -> Result<CameraFrame> {
        let name = match camera {
            Some(name) => name.to_string(),
            None => self
                .shared
                .cameras
                .first()
                .cloned()
                .ok_or_else(|| NeosceneError::RenderUnavailable {
                    reason: "scene declares no cameras".to_string(),
                })?,
        };

        if !self.shared.cameras.iter().any(|c| c == &name) {
            return Err(NeosceneError::RenderUnavailable {
                reason: format!("camera '{}' not in scene", name),
            });
        }

        self.shared
            .frames
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| NeosceneError::RenderUnavailable {
                reason: format!("no frame rendered yet for camera '{}'", name),
            })
    }

    pub fn cameras(&self) -> &[String] {
        &self.shared.cameras
    }

    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for the in-flight tick to finish. After this
    /// returns the backend instance has been dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SimWorker {
    fn drop(&mut self) {
        // Last-resort cancellation if shutdown was never awaited
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Backend double recording applied controls, optionally failing after
    /// a fixed number of steps, flagging its own drop.
    struct TestInstance {
        timestep: f64,
        steps: u64,
        fail_after: Option<u64>,
        applied: Arc<Mutex<Vec<ControlCommand>>>,
        dropped: Arc<AtomicBool>,
        cameras: Vec<String>,
    }

    impl TestInstance {
        fn new(fail_after: Option<u64>) -> (Self, Arc<Mutex<Vec<ControlCommand>>>, Arc<AtomicBool>) {
            let applied = Arc::new(Mutex::new(Vec::new()));
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    timestep: 0.002,
                    steps: 0,
                    fail_after,
                    applied: applied.clone(),
                    dropped: dropped.clone(),
                    cameras: vec!["cam_a".to_string(), "cam_b".to_string()],
                },
                applied,
                dropped,
            )
        }
    }

    impl Drop for TestInstance {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl BackendInstance for TestInstance {
        fn timestep(&self) -> f64 {
            self.timestep
        }

        fn sim_time(&self) -> f64 {
            self.steps as f64 * self.timestep
        }

        fn apply_control(&mut self, control: ControlCommand) {
            self.applied.lock().push(control);
        }

        fn step(&mut self) -> crate::error::Result<()> {
            if let Some(limit) = self.fail_after {
                if self.steps >= limit {
                    return Err(NeosceneError::SimulationDegraded {
                        reason: "injected fault".to_string(),
                    });
                }
            }
            self.steps += 1;
            Ok(())
        }

        fn read_sensors(&self) -> BTreeMap<String, Vec<f64>> {
            let mut values = BTreeMap::new();
            values.insert("steps".to_string(), vec![self.steps as f64]);
            values
        }

        fn render(&mut self, camera: &str, tick: u64) -> crate::error::Result<CameraFrame> {
            Ok(CameraFrame {
                camera: camera.to_string(),
                content_type: "image/x-test".to_string(),
                data: vec![1, 2, 3],
                tick,
            })
        }
    }

    fn spawn_test_worker(
        fail_after: Option<u64>,
    ) -> (Arc<SimWorker>, Arc<Mutex<Vec<ControlCommand>>>, Arc<AtomicBool>) {
        let (instance, applied, dropped) = TestInstance::new(fail_after);
        let cameras = instance.cameras.clone();
        let worker = SimWorker::spawn(
            Box::new(instance),
            cameras,
            ControlCommand::neutral(),
            WorkerConfig {
                render_every_ticks: 5,
                min_tick_interval: Duration::from_millis(1),
            },
        );
        (worker, applied, dropped)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_advance_and_snapshot_refreshes() {
        let (worker, _applied, _dropped) = spawn_test_worker(None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.ticks() > 0);

        let snapshot = worker.read_sensors();
        assert!(!snapshot.stale);
        assert!(snapshot.values["steps"][0] > 0.0);

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_available_before_first_tick() {
        // Long period: the pre-populated snapshot must already be readable
        let (instance, _applied, _dropped) = TestInstance::new(None);
        let cameras = instance.cameras.clone();
        let worker = SimWorker::spawn(
            Box::new(instance),
            cameras,
            ControlCommand::neutral(),
            WorkerConfig {
                render_every_ticks: 5,
                min_tick_interval: Duration::from_secs(3600),
            },
        );

        let snapshot = worker.read_sensors();
        assert!(snapshot.values.contains_key("steps"));
        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins_between_ticks() {
        // 10 s period: the first tick fires immediately, then nothing for
        // a long time, giving a race-free window to overwrite the slot.
        let (instance, applied, _dropped) = TestInstance::new(None);
        let cameras = instance.cameras.clone();
        let worker = SimWorker::spawn(
            Box::new(instance),
            cameras,
            ControlCommand::neutral(),
            WorkerConfig {
                render_every_ticks: 1000,
                min_tick_interval: Duration::from_secs(10),
            },
        );

        // Let the immediate first tick drain
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = applied.lock().len();

        let overwritten = ControlCommand::new(0.3, 0.0);
        let winner = ControlCommand::new(1.0, -0.5);
        worker.set_control(overwritten);
        worker.set_control(winner);

        // Cross the next tick boundary
        tokio::time::sleep(Duration::from_secs(11)).await;

        let applied = applied.lock();
        assert!(applied.len() > before);
        // Every application after the overwrite is the winner; the
        // intermediate command was coalesced away.
        for cmd in &applied[before..] {
            assert_eq!(cmd.throttle, winner.throttle);
            assert_eq!(cmd.steering, winner.steering);
        }
        drop(applied);

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_render_on_cadence() {
        let (worker, _applied, _dropped) = spawn_test_worker(None);

        // Before any render tick: unavailable
        // (first render happens at tick 5 with render_every=5)
        let early = worker.frame(None);
        if let Err(e) = &early {
            assert!(matches!(e, NeosceneError::RenderUnavailable { .. }));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        let frame = worker.frame(None).unwrap();
        assert_eq!(frame.camera, "cam_a");
        assert_eq!(frame.data, vec![1, 2, 3]);

        let named = worker.frame(Some("cam_b")).unwrap();
        assert_eq!(named.camera, "cam_b");

        let missing = worker.frame(Some("ghost")).unwrap_err();
        assert!(matches!(missing, NeosceneError::RenderUnavailable { .. }));

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_failure_degrades_and_stops() {
        let (worker, _applied, dropped) = spawn_test_worker(Some(3));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(worker.is_degraded());
        let snapshot = worker.read_sensors();
        assert!(snapshot.stale);
        // Last good values survive
        assert_eq!(snapshot.values["steps"][0], 3.0);

        // Loop stopped: tick count frozen
        let ticks = worker.ticks();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(worker.ticks(), ticks);

        // Loop exit released the instance even without shutdown
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dropped.load(Ordering::SeqCst));

        worker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_instance() {
        let (worker, _applied, dropped) = spawn_test_worker(None);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!dropped.load(Ordering::SeqCst));

        worker.shutdown().await;
        assert!(dropped.load(Ordering::SeqCst));
    }
}
