use crate::TraceResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
    Failed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub result: TraceResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub source_ip: String,
    pub destination_ip: String,
    pub allowed: bool,
    pub hop_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        SessionSummary {
            id: session.id.clone(),
            created_at: session.created_at,
            status: session.status,
            source_ip: session.result.source_ip.clone(),
            destination_ip: session.result.destination_ip.clone(),
            allowed: session.result.allowed,
            hop_count: session.result.hops.len(),
        }
    }
}

/// In-memory trace sessions. Entries live until deleted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` under `id`. Rewriting an id keeps its creation time.
    pub fn put(&self, id: &str, status: SessionStatus, result: TraceResult) {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let created_at = sessions.get(id).map_or(now, |s| s.created_at);
        sessions.insert(
            id.to_string(),
            Session {
                id: id.to_string(),
                created_at,
                updated_at: now,
                status,
                result,
            },
        );
        debug!(session = id, ?status, "session stored");
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read();
        let mut summaries: Vec<SessionSummary> = sessions.values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TraceRequest;
    use chrono::Duration;
    use object_model::Protocol;

    fn result(id: &str) -> TraceResult {
        let req = TraceRequest::new("10.0.0.1", "10.0.0.2", 80, Protocol::Tcp);
        TraceResult::start(id.to_string(), &req)
    }

    #[test]
    fn put_get_delete() {
        let store = SessionStore::new();
        store.put("a", SessionStatus::Completed, result("a"));
        assert_eq!(store.get("a").unwrap().status, SessionStatus::Completed);
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn rewrite_keeps_created_at() {
        let store = SessionStore::new();
        store.put("a", SessionStatus::Error, result("a"));
        let first = store.get("a").unwrap();
        store.put("a", SessionStatus::Completed, result("a"));
        let second = store.get("a").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.status, SessionStatus::Completed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn list_is_newest_first() {
        let store = SessionStore::new();
        store.put("old", SessionStatus::Completed, result("old"));
        store.put("new", SessionStatus::Failed, result("new"));
        {
            let mut sessions = store.sessions.write();
            let old = sessions.get_mut("old").unwrap();
            old.created_at -= Duration::seconds(60);
        }
        let ids: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
