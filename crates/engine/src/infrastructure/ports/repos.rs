//! Repository port traits for session persistence.

use async_trait::async_trait;
use taleweaver_domain::{GameState, SessionId};

use super::error::RepoError;

// =============================================================================
// Session Storage
// =============================================================================

/// Stores one snapshot per session. `save` replaces the previous snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn load(&self, id: SessionId) -> Result<Option<GameState>, RepoError>;
    async fn save(&self, id: SessionId, state: &GameState) -> Result<(), RepoError>;
}
