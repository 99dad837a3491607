use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    collaborator::Collaborators,
    controller::{FlowConfig, WorkflowController},
};

/// One user's analysis session: a controller plus its identity.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub controller: Arc<WorkflowController>,
    pub created_at: SystemTime,
}

impl Session {
    pub fn new(config: FlowConfig, collaborators: Collaborators) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            controller: Arc::new(WorkflowController::new(config, collaborators)),
            created_at: SystemTime::now(),
        }
    }

    /// Older than `max_age` and not in the middle of an operation.
    pub fn is_expired(&self, max_age: Duration, now: SystemTime) -> bool {
        let age = now.duration_since(self.created_at).unwrap_or_default();
        age > max_age && !self.controller.is_busy()
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session);
    async fn get(&self, id: &str) -> Option<Session>;
    async fn delete(&self, id: &str) -> Option<Session>;
    async fn list(&self) -> Vec<String>;
    /// Drop idle sessions older than `max_age`, returning their ids.
    async fn evict_expired(&self, max_age: Duration) -> Vec<String>;
}

/// In-memory implementation of SessionStorage
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    async fn delete(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    async fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn evict_expired(&self, max_age: Duration) -> Vec<String> {
        let now = SystemTime::now();
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let expired = session.is_expired(max_age, now);
            if expired {
                evicted.push(id.clone());
            }
            !expired
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted expired sessions");
        }
        evicted
    }
}
