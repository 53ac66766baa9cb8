use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{StateStore, VersionedState};
use crate::models::AgentState;

/// In-memory state store keyed by agent id.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<IndexMap<String, VersionedState>>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an agent's state unconditionally, returning the new version.
    pub fn seed(&self, agent: impl Into<String>, state: AgentState) -> u64 {
        let mut entries = self.entries.write();
        let entry = entries.entry(agent.into()).or_insert(VersionedState {
            version: 0,
            state: AgentState::default(),
        });
        entry.version += 1;
        entry.state = state;
        entry.version
    }

    /// Latest state without version, for inspection.
    #[must_use]
    pub fn snapshot(&self, agent: &str) -> Option<AgentState> {
        self.entries.read().get(agent).map(|entry| entry.state.clone())
    }

    /// Agents known to the store, in insertion order.
    #[must_use]
    pub fn agents(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, agent: &str) -> Result<Option<VersionedState>> {
        Ok(self.entries.read().get(agent).cloned())
    }

    async fn compare_and_swap(
        &self,
        agent: &str,
        expected: Option<u64>,
        state: AgentState,
    ) -> Result<bool> {
        let mut entries = self.entries.write();
        let current = entries.get(agent).map(|entry| entry.version);
        if current != expected {
            return Ok(false);
        }
        let version = current.map_or(1, |version| version + 1);
        entries.insert(agent.to_string(), VersionedState { version, state });
        Ok(true)
    }
}
