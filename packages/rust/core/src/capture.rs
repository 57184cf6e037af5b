//! Capture gate: decides when the chat UI should ask a visitor for contact details.

use std::sync::Arc;

use chrono::Utc;
use leadpipe_shared::{ConversationMessage, Result, Role};
use leadpipe_storage::KeyValueStore;
use tracing::debug;

/// User turns required before the visitor is asked for their details.
pub const MIN_USER_TURNS: usize = 3;

/// Per-session capture flags over a [`KeyValueStore`].
pub struct CaptureGate {
    store: Arc<dyn KeyValueStore>,
    min_user_turns: usize,
}

impl CaptureGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            min_user_turns: MIN_USER_TURNS,
        }
    }

    pub fn with_min_user_turns(mut self, turns: usize) -> Self {
        self.min_user_turns = turns;
        self
    }

    /// True once the visitor has said enough and was neither captured nor skipped.
    pub async fn should_prompt(
        &self,
        session_id: &str,
        history: &[ConversationMessage],
    ) -> Result<bool> {
        let user_turns = history.iter().filter(|m| m.role == Role::User).count();
        if user_turns < self.min_user_turns {
            return Ok(false);
        }

        if self.store.get(&captured_key(session_id)).await?.is_some()
            || self.store.get(&skipped_key(session_id)).await?.is_some()
        {
            return Ok(false);
        }

        debug!(session_id, user_turns, "visitor eligible for lead capture");
        Ok(true)
    }

    /// Record that the visitor submitted their details.
    pub async fn mark_captured(&self, session_id: &str) -> Result<()> {
        self.store
            .set(&captured_key(session_id), &Utc::now().to_rfc3339())
            .await
    }

    /// Record that the visitor dismissed the form.
    pub async fn mark_skipped(&self, session_id: &str) -> Result<()> {
        self.store
            .set(&skipped_key(session_id), &Utc::now().to_rfc3339())
            .await
    }
}

fn captured_key(session_id: &str) -> String {
    format!("lead_captured:{session_id}")
}

fn skipped_key(session_id: &str) -> String {
    format!("lead_capture_skipped:{session_id}")
}
