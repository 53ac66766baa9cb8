use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::PersonalitySource;
use crate::models::PersonalityInfluence;

/// Fixed personality table with an optional default for unknown agents.
#[derive(Debug, Clone, Default)]
pub struct StaticPersonality {
    profiles: Arc<RwLock<IndexMap<String, PersonalityInfluence>>>,
    fallback: Option<PersonalityInfluence>,
}

impl StaticPersonality {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers traits for an agent.
    #[must_use]
    pub fn with_agent(self, agent: impl Into<String>, traits: PersonalityInfluence) -> Self {
        self.profiles.write().insert(agent.into(), traits);
        self
    }

    /// Traits returned for agents without an entry.
    #[must_use]
    pub const fn with_default(mut self, traits: PersonalityInfluence) -> Self {
        self.fallback = Some(traits);
        self
    }

    /// Replaces an agent's traits at runtime.
    pub fn update(&self, agent: impl Into<String>, traits: PersonalityInfluence) {
        self.profiles.write().insert(agent.into(), traits);
    }
}

#[async_trait]
impl PersonalitySource for StaticPersonality {
    async fn personality_for(&self, agent: &str) -> Result<Option<PersonalityInfluence>> {
        Ok(self.profiles.read().get(agent).copied().or(self.fallback))
    }
}
