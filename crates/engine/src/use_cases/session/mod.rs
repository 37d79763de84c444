//! Live sessions.
//!
//! A [`GameSession`] is the committed state of one playthrough plus its
//! outstanding media jobs. The [`SessionRegistry`] keeps open sessions in
//! memory, each behind its own async mutex, so at most one turn per session is
//! in flight. A second turn arriving meanwhile is rejected rather than queued.
//! Sessions left idle are evicted and reopen from storage on next use.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use taleweaver_domain::{GameState, MediaJobId, SessionId, StateSummary};
use tokio::sync::Mutex;

use crate::infrastructure::ports::{MediaJobHandle, MediaStatus};
use crate::use_cases::turn::{GameEngine, TurnError, TurnResult};

/// Finished media jobs kept around for polling.
const MAX_FINISHED_MEDIA: usize = 16;
/// Renders allowed in flight per session; the oldest is cancelled beyond this.
const MAX_PENDING_MEDIA: usize = 4;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One playthrough's committed state.
#[derive(Debug)]
pub struct GameSession {
    state: GameState,
    /// In submission order.
    media_jobs: Vec<MediaJobHandle>,
}

impl GameSession {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            media_jobs: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.state.session_id
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Replaces the committed state after a successful save.
    pub(crate) fn commit(&mut self, state: GameState) {
        self.state = state;
    }

    pub(crate) fn track_media(&mut self, handle: MediaJobHandle) {
        self.media_jobs.push(handle);

        if self.pending_media() > MAX_PENDING_MEDIA {
            if let Some(oldest) = self.media_jobs.iter().position(|j| !j.is_finished()) {
                let stale = self.media_jobs.remove(oldest);
                tracing::warn!(job_id = %stale.id(), "Too many renders in flight, cancelling the oldest");
                stale.cancel();
            }
        }

        let finished = self.media_jobs.iter().filter(|j| j.is_finished()).count();
        let mut excess = finished.saturating_sub(MAX_FINISHED_MEDIA);
        self.media_jobs.retain(|job| {
            if excess > 0 && job.is_finished() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    pub fn media_status(&self, job_id: MediaJobId) -> Option<MediaStatus> {
        self.media_jobs
            .iter()
            .find(|j| j.id() == job_id)
            .map(MediaJobHandle::status)
    }

    pub fn pending_media(&self) -> usize {
        self.media_jobs.iter().filter(|j| !j.is_finished()).count()
    }

    /// Cancels every media job that has not finished.
    pub fn cancel_media(&self) {
        for job in self.media_jobs.iter().filter(|j| !j.is_finished()) {
            job.cancel();
        }
    }
}

/// Returned when a session is opened or created.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub world_id: String,
    pub intro: Option<String>,
    pub state: StateSummary,
}

struct OpenSession {
    session: Arc<Mutex<GameSession>>,
    last_used: DateTime<Utc>,
}

impl OpenSession {
    fn new(session: GameSession, now: DateTime<Utc>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            last_used: now,
        }
    }
}

pub struct SessionRegistry {
    engine: Arc<GameEngine>,
    sessions: DashMap<SessionId, OpenSession>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(engine: Arc<GameEngine>) -> Self {
        Self {
            engine,
            sessions: DashMap::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn open_count(&self) -> usize {
        self.sessions.len()
    }

    /// Starts a new playthrough and keeps it open.
    pub async fn create(&self) -> Result<SessionView, TurnError> {
        let session = self.engine.new_session().await?;
        let view = SessionView {
            session_id: session.id(),
            world_id: session.state().world_id.to_string(),
            intro: Some(self.engine.world().intro()),
            state: session.state().summary(),
        };
        self.sessions
            .insert(session.id(), OpenSession::new(session, self.engine.now()));
        tracing::info!(session_id = %view.session_id, "Session created");
        Ok(view)
    }

    /// Returns the open session, restoring it from storage if needed.
    async fn get_or_load(&self, id: SessionId) -> Result<Arc<Mutex<GameSession>>, TurnError> {
        let now = self.engine.now();
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.last_used = now;
            return Ok(entry.session.clone());
        }
        let session = self.engine.load_session(id).await?;
        // Another request may have loaded it meanwhile; keep the first one.
        let entry = self
            .sessions
            .entry(id)
            .or_insert_with(|| OpenSession::new(session, now));
        Ok(entry.session.clone())
    }

    pub async fn summary(&self, id: SessionId) -> Result<SessionView, TurnError> {
        let session = self.get_or_load(id).await?;
        let guard = session
            .try_lock()
            .map_err(|_| TurnError::TurnInProgress(id))?;
        Ok(SessionView {
            session_id: id,
            world_id: guard.state().world_id.to_string(),
            intro: None,
            state: guard.state().summary(),
        })
    }

    /// Plays one turn. Fails fast with `TurnInProgress` if another turn for
    /// the same session is still running.
    pub async fn play(&self, id: SessionId, input: &str) -> Result<TurnResult, TurnError> {
        let session = self.get_or_load(id).await?;
        let mut guard = session
            .try_lock()
            .map_err(|_| TurnError::TurnInProgress(id))?;
        self.engine.play_turn(&mut guard, input).await
    }

    pub async fn media_status(
        &self,
        id: SessionId,
        job_id: MediaJobId,
    ) -> Result<Option<MediaStatus>, TurnError> {
        let session = self
            .sessions
            .get(&id)
            .map(|entry| entry.session.clone())
            .ok_or(TurnError::SessionNotFound(id))?;
        let guard = session
            .try_lock()
            .map_err(|_| TurnError::TurnInProgress(id))?;
        Ok(guard.media_status(job_id))
    }

    /// Drops the session from memory and cancels its media jobs. The
    /// persisted snapshot stays, so the session can be reopened later.
    pub async fn close(&self, id: SessionId) -> Result<(), TurnError> {
        let Some((_, open)) = self.sessions.remove(&id) else {
            return Err(TurnError::SessionNotFound(id));
        };
        let guard = open.session.lock().await;
        let pending = guard.pending_media();
        guard.cancel_media();
        tracing::info!(session_id = %id, cancelled_media = pending, "Session closed");
        Ok(())
    }

    /// Drops sessions unused for longer than the idle timeout and returns how
    /// many went. Sessions mid-turn or still rendering media stay open.
    pub fn evict_idle(&self) -> usize {
        let Ok(idle) = chrono::Duration::from_std(self.idle_timeout) else {
            return 0;
        };
        let cutoff = self.engine.now() - idle;
        let mut evicted = 0;
        self.sessions.retain(|id, open| {
            if open.last_used > cutoff {
                return true;
            }
            match open.session.try_lock() {
                Ok(session) if session.pending_media() == 0 => {
                    tracing::debug!(session_id = %id, "Evicting idle session");
                    evicted += 1;
                    false
                }
                _ => true,
            }
        });
        evicted
    }
}
