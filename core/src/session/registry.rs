//! Process-wide session registry
//!
//! The id-to-session map is guarded separately from any individual
//! session's internals, so operations on different sessions never contend.
//! Eviction removes entries under the map lock and tears workers down
//! outside it: a request racing an eviction observes either the live
//! session or a clean `SessionNotFound`, never a half-destroyed one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{NeosceneError, Result};
use crate::session::session::Session;
use crate::{debug_log, info_log};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    /// Look up an existing session or create a fresh one.
    ///
    /// An unknown or absent id always yields a session under a newly
    /// generated id: identifiers are never recycled, so an evicted id can
    /// not be resurrected by a late client.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Arc<Session>, bool) {
        if let Some(id) = id {
            if let Some(session) = self.sessions.read().get(&id) {
                return (session.clone(), false);
            }
        }

        let new_id = Uuid::new_v4();
        let session = Arc::new(Session::new(new_id, self.history_limit));
        self.sessions.write().insert(new_id, session.clone());
        info_log!("Created session {}", new_id);
        (session, true)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(NeosceneError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    pub fn touch(&self, id: Uuid) -> Result<()> {
        self.get(id)?.touch();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.sessions.read().keys().copied().collect()
    }

    /// Remove sessions idle longer than `max_age` and tear down their
    /// workers. Returns the number of sessions evicted.
    pub async fn evict_idle(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::seconds(0));

        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| s.last_active() < cutoff)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let count = expired.len();
        for session in expired {
            info_log!("Evicting idle session {}", session.id());
            session.teardown().await;
        }
        count
    }

    /// Remove and tear down every session (shutdown path)
    pub async fn shutdown(&self) {
        let all: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in all {
            session.teardown().await;
        }
    }

    /// Spawn the background eviction sweep. Returns a token that stops it.
    pub fn start_eviction(
        self: &Arc<Self>,
        sweep_interval: Duration,
        max_age: Duration,
    ) -> CancellationToken {
        let cancel = CancellationToken::new();
        let registry = self.clone();
        let loop_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Skip the immediate first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let evicted = registry.evict_idle(max_age).await;
                if evicted > 0 {
                    debug_log!("Eviction sweep removed {} session(s)", evicted);
                }
            }
        });

        cancel
    }
}
