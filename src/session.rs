//! Session collaborator.
//!
//! The checkout core never manages authentication itself. It only tells the
//! session layer that the identity it cached is no longer accepted by the
//! order API, so the next read goes back to the source.

use std::sync::RwLock;
use tracing::info;

pub trait SessionStore: Send + Sync {
    /// Drop any cached identity state.
    fn invalidate(&self);

    /// Bearer token of the cached identity, if any.
    fn access_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub username: String,
    pub access_token: String,
}

/// In-process identity cache used by the binary.
#[derive(Debug, Default)]
pub struct CachedSession {
    user: RwLock<Option<SessionUser>>,
}

impl CachedSession {
    pub fn new(user: Option<SessionUser>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.user.read().ok().and_then(|guard| guard.clone())
    }
}

impl SessionStore for CachedSession {
    fn invalidate(&self) {
        if let Ok(mut guard) = self.user.write() {
            if let Some(user) = guard.take() {
                info!(username = %user.username, "session invalidated");
            }
        }
    }

    fn access_token(&self) -> Option<String> {
        self.user().map(|u| u.access_token)
    }
}
