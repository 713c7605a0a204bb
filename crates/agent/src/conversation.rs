use std::collections::HashMap;
use std::sync::Mutex;

use azops_core::domain::resource::{ParameterField, ResourceDraft};

/// A draft waiting on the user's answer to one clarifying question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDraft {
    pub draft: ResourceDraft,
    pub asked: ParameterField,
}

/// Per-session conversation state. Sessions are independent; a draft lives
/// here only until it is complete or cancelled.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, PendingDraft>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<PendingDraft> {
        let sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.get(session_id).cloned()
    }

    pub fn put(&self, session_id: impl Into<String>, pending: PendingDraft) {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.insert(session_id.into(), pending);
    }

    pub fn clear(&self, session_id: &str) -> Option<PendingDraft> {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        match self.sessions.lock() {
            Ok(sessions) => sessions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns true for messages that abandon the current draft.
pub fn is_cancel(text: &str) -> bool {
    matches!(
        text.trim().trim_end_matches(['.', '!']).to_ascii_lowercase().as_str(),
        "cancel" | "stop" | "abort" | "never mind" | "nevermind" | "start over"
    )
}
