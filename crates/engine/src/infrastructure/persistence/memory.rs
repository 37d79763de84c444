use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use taleweaver_domain::{GameState, SessionId};

use crate::infrastructure::ports::{RepoError, SessionRepo};

/// Process-local session store. Snapshots are lost on restart.
#[derive(Default)]
pub struct InMemorySessionRepo {
    sessions: RwLock<HashMap<SessionId, GameState>>,
}

impl InMemorySessionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRepo for InMemorySessionRepo {
    async fn load(&self, id: SessionId) -> Result<Option<GameState>, RepoError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save(&self, id: SessionId, state: &GameState) -> Result<(), RepoError> {
        self.sessions.write().await.insert(id, state.clone());
        Ok(())
    }
}
