//! Session registry
//!
//! Routes events to the worker of the session they name. Sessions share
//! nothing with each other; a failure in one never touches another.

use std::collections::HashMap;
use std::sync::Arc;

use concentric_core::{
    EngineResult, PropagationConfig, SessionEvent, SessionId, Timestamp, ValidationError,
};
use concentric_diffusion::SessionSnapshot;
use parking_lot::RwLock;

use crate::{spawn_session, MonotonicTimeSource, RuntimeConfig, SessionHandle, TimeSource};

/// All sessions hosted by this process
pub struct Runtime {
    config: RuntimeConfig,
    /// Clock shared by every session; `None` gives each session its own
    time: Option<Arc<dyn TimeSource>>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl Runtime {
    /// Runtime whose sessions each run on a monotonic clock starting at
    /// zero when the session is created
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            time: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Runtime whose sessions all read `time`
    pub fn with_time_source(config: RuntimeConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            time: Some(time),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn session_clock(&self) -> Arc<dyn TimeSource> {
        match &self.time {
            Some(time) => time.clone(),
            None => Arc::new(MonotonicTimeSource::new()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawn a worker for `session`
    ///
    /// Uses the runtime's default propagation parameters unless `config` is
    /// given. Must be called from within a tokio runtime.
    pub fn create_session(
        &self,
        session: SessionId,
        config: Option<PropagationConfig>,
    ) -> EngineResult<SessionHandle> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session) {
            return Err(ValidationError::DuplicateSession(session).into());
        }

        let config = config.unwrap_or_else(|| self.config.propagation.clone());
        let (handle, _join) = spawn_session(session, config, &self.config, self.session_clock())?;
        sessions.insert(session, handle.clone());

        tracing::info!(session = %session, active = sessions.len(), "session created");
        Ok(handle)
    }

    pub fn session(&self, session: SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(&session).cloned()
    }

    /// Queue `event` on its session's worker
    pub fn route(&self, event: SessionEvent) -> EngineResult<()> {
        let session = event.session();
        let handle = self
            .session(session)
            .ok_or(ValidationError::UnknownSession(session))?;

        let ends = matches!(event, SessionEvent::Ended { .. });
        handle.submit(event)?;
        if ends {
            self.sessions.write().remove(&session);
        }
        Ok(())
    }

    /// End `session`, drop it from the registry and return its final state
    pub async fn end_session(&self, session: SessionId, at: Timestamp) -> EngineResult<SessionSnapshot> {
        let handle = self
            .sessions
            .write()
            .remove(&session)
            .ok_or(ValidationError::UnknownSession(session))?;
        handle.end(at).await
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
