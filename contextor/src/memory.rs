//! Conversation memory keyed by session id.
//!
//! The in-memory store keeps temporary sessions for a TTL only; named
//! sessions live for the process lifetime. Concurrent appends to one
//! session are serialized by the lock, last write wins.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rag_store::BoxFuture;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Messages rendered into the prompt's history section.
pub const HISTORY_MESSAGES: usize = 12;
const MAX_STORED_MESSAGES: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
}

pub trait ConversationMemory: Send + Sync {
    fn load_history<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<StoredMessage>>>;

    fn append_turn<'a>(
        &'a self,
        session_id: &'a str,
        question: &'a str,
        answer: &'a str,
        temporary: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

/// `role: content` lines of the last `last_n` messages.
pub fn render_recent(history: &[StoredMessage], last_n: usize) -> String {
    let start = history.len().saturating_sub(last_n);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

struct SessionLog {
    messages: Vec<StoredMessage>,
    expires_at: Option<Instant>,
}

impl SessionLog {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

pub struct InMemoryMemory {
    sessions: RwLock<HashMap<String, SessionLog>>,
    ttl: Duration,
}

impl InMemoryMemory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    async fn load(&self, session_id: &str) -> Vec<StoredMessage> {
        let now = Instant::now();
        let guard = self.sessions.read().await;
        match guard.get(session_id) {
            Some(log) if !log.expired(now) => log.messages.clone(),
            _ => Vec::new(),
        }
    }

    async fn append(&self, session_id: &str, question: &str, answer: &str, temporary: bool) {
        let now = Instant::now();
        let mut guard = self.sessions.write().await;
        guard.retain(|_, log| !log.expired(now));

        let log = guard.entry(session_id.to_string()).or_insert_with(|| SessionLog {
            messages: Vec::new(),
            expires_at: None,
        });
        log.messages.push(StoredMessage {
            role: Role::User,
            content: question.to_string(),
        });
        log.messages.push(StoredMessage {
            role: Role::Assistant,
            content: answer.to_string(),
        });
        let overflow = log.messages.len().saturating_sub(MAX_STORED_MESSAGES);
        log.messages.drain(..overflow);
        log.expires_at = temporary.then(|| now + self.ttl);

        debug!(session = session_id, messages = log.messages.len(), temporary, "turn stored");
    }
}

impl ConversationMemory for InMemoryMemory {
    fn load_history<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<StoredMessage>>> {
        Box::pin(async move { Ok(self.load(session_id).await) })
    }

    fn append_turn<'a>(
        &'a self,
        session_id: &'a str,
        question: &'a str,
        answer: &'a str,
        temporary: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.append(session_id, question, answer, temporary).await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn turns_render_as_role_lines() {
        let mem = InMemoryMemory::new(Duration::from_secs(60));
        mem.append_turn("s1", "hi", "hello", false).await.unwrap();
        mem.append_turn("s1", "who?", "me", false).await.unwrap();

        let history = mem.load_history("s1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(render_recent(&history, 3), "assistant: hello\nuser: who?\nassistant: me");
        assert!(mem.load_history("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn temporary_sessions_expire() {
        let mem = InMemoryMemory::new(Duration::from_millis(20));
        mem.append_turn("temp-1", "q", "a", true).await.unwrap();
        mem.append_turn("named", "q", "a", false).await.unwrap();
        assert_eq!(mem.load_history("temp-1").await.unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(mem.load_history("temp-1").await.unwrap().is_empty());
        assert_eq!(mem.load_history("named").await.unwrap().len(), 2);
    }

    #[test]
    fn render_handles_short_history() {
        assert_eq!(render_recent(&[], HISTORY_MESSAGES), "");
    }
}
