use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Correlation identity of one mounted billing prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSession {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

/// Hands out prompt session ids. Ids only grow for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
}

static GLOBAL_SESSIONS: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every prompt in the process.
    pub fn global() -> &'static Self {
        GLOBAL_SESSIONS.get_or_init(Self::new)
    }

    pub fn assign(&self) -> PromptSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        PromptSession {
            id,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn matches(message_id: u64, session: &PromptSession) -> bool {
        message_id == session.id
    }
}
