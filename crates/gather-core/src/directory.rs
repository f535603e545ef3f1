//! Collaborators owned by the surrounding application: the user directory
//! and the event catalog. Chat only reads from them.

use gather_models::EventSummary;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("lookup failed: {0}")]
    Lookup(String),
}

pub trait UserDirectory: Send + Sync {
    fn display_name(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<String>, DirectoryError>> + Send;
}

pub trait EventCatalog: Send + Sync {
    fn list_events(&self) -> impl Future<Output = Result<Vec<EventSummary>, DirectoryError>> + Send;
}

/// Fixed directory and catalog, for embedding without a backend and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
    events: Vec<EventSummary>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: &str, display_name: &str) -> Self {
        self.names
            .insert(user_id.to_string(), display_name.to_string());
        self
    }

    pub fn with_event(mut self, id: &str, title: &str) -> Self {
        self.events.push(EventSummary::new(id, title));
        self
    }
}

impl UserDirectory for StaticDirectory {
    async fn display_name(&self, user_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.names.get(user_id).cloned())
    }
}

impl EventCatalog for StaticDirectory {
    async fn list_events(&self) -> Result<Vec<EventSummary>, DirectoryError> {
        Ok(self.events.clone())
    }
}
