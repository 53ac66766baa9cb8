//! Contracts for the services a decision cycle depends on.
//!
//! Every contract is an async trait returning `anyhow::Result`; the
//! orchestrator bounds each call with a timeout and never lets a failure
//! escape the cycle.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ActionPlan, AgentState, DecisionTrace, PersonalityInfluence};

/// Static personality tables.
pub mod personality;
/// Policy gates and chains.
pub mod policy;
/// Versioned in-memory state store.
pub mod store;
/// Decision trace sinks.
pub mod trace;

pub use personality::StaticPersonality;
pub use policy::{PolicyChain, RiskCeilingGate};
pub use store::MemoryStateStore;
pub use trace::{JsonlTraceSink, MemoryTraceSink};

/// Verdict returned by a policy gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyVerdict {
    /// Whether the plan may be handed off.
    pub approved: bool,
    /// Flags explaining the verdict.
    pub flags: BTreeSet<String>,
}

impl PolicyVerdict {
    /// Approval without flags.
    #[must_use]
    pub fn approve() -> Self {
        Self {
            approved: true,
            flags: BTreeSet::new(),
        }
    }

    /// Denial carrying one flag.
    #[must_use]
    pub fn deny(flag: impl Into<String>) -> Self {
        Self {
            approved: false,
            flags: BTreeSet::from([flag.into()]),
        }
    }

    /// Adds a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }
}

/// Safety and policy rule engine consulted before hand-off.
#[async_trait]
pub trait PolicyGate: Send + Sync {
    /// Gate name used in logs.
    fn name(&self) -> &str;

    /// Checks one plan.
    async fn check_plan(&self, plan: &ActionPlan) -> Result<PolicyVerdict>;
}

/// Append-only audit destination for decision traces.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Persists one trace.
    async fn log_decision_trace(&self, trace: &DecisionTrace) -> Result<()>;
}

/// Agent state paired with the store version it was read at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedState {
    /// Store version, bumped on every successful write.
    pub version: u64,
    /// State at that version.
    pub state: AgentState,
}

/// Per-agent state persistence with optimistic concurrency.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Latest state, or `None` for an unknown agent.
    async fn load(&self, agent: &str) -> Result<Option<VersionedState>>;

    /// Writes `state` only if the stored version still equals `expected`
    /// (`None` meaning the agent must not exist yet). Returns whether it wrote.
    async fn compare_and_swap(
        &self,
        agent: &str,
        expected: Option<u64>,
        state: AgentState,
    ) -> Result<bool>;
}

/// Source of personality traits per agent.
#[async_trait]
pub trait PersonalitySource: Send + Sync {
    /// Traits for the agent, if the source knows it.
    async fn personality_for(&self, agent: &str) -> Result<Option<PersonalityInfluence>>;
}
