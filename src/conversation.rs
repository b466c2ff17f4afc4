//! In-memory session store.
//!
//! Sessions live for the process lifetime and hold a rolling window of
//! recent turns; nothing here touches the database. Each session carries a
//! gate so concurrent questions against the same session run one at a time,
//! while different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{AskResponse, ConversationTurn, Role};

struct SessionState {
    turns: Vec<ConversationTurn>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Keyed by session id. Retention per session equals the prompt window, so
/// `history` is exactly what context assembly may use.
pub struct SessionStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a caller-supplied session id, creating the session when the
    /// id is absent or unknown. Returns the id and the session's gate.
    pub fn resolve(&self, session_id: Option<&str>) -> (String, Arc<tokio::sync::Mutex<()>>) {
        let id = match session_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let state = sessions.entry(id.clone()).or_insert_with(SessionState::new);
        (id, Arc::clone(&state.gate))
    }

    /// Retained turns for a session, oldest first. Unknown ids yield an
    /// empty history.
    pub fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Append the user question and the composed answer as two turns,
    /// dropping the oldest turns past the retention window.
    pub fn record_exchange(&self, session_id: &str, query: &str, response: &AskResponse) {
        let now = Utc::now();
        let user = ConversationTurn {
            turn_id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: query.to_string(),
            timestamp: now,
            retrieved_chunk_ids: Vec::new(),
            function_calls: Vec::new(),
        };
        let assistant = ConversationTurn {
            turn_id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text: response.answer_text.clone(),
            timestamp: now,
            retrieved_chunk_ids: response
                .sources
                .iter()
                .map(|s| s.chunk_id.clone())
                .collect(),
            function_calls: response.function_calls.clone(),
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionState::new);
        state.turns.push(user);
        state.turns.push(assistant);
        if state.turns.len() > self.max_turns {
            let excess = state.turns.len() - self.max_turns;
            state.turns.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
