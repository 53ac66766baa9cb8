use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{PolicyGate, PolicyVerdict};
use crate::models::ActionPlan;

/// Gate that denies plans above a fixed risk ceiling or cost limit.
#[derive(Debug, Clone)]
pub struct RiskCeilingGate {
    max_risk: f64,
    max_cost: Option<u64>,
}

impl RiskCeilingGate {
    /// Creates a gate denying plans riskier than `max_risk`.
    #[must_use]
    pub const fn new(max_risk: f64) -> Self {
        Self {
            max_risk,
            max_cost: None,
        }
    }

    /// Also denies plans costing more than `max_cost`.
    #[must_use]
    pub const fn with_max_cost(mut self, max_cost: u64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }
}

#[async_trait]
impl PolicyGate for RiskCeilingGate {
    fn name(&self) -> &str {
        "risk_ceiling"
    }

    async fn check_plan(&self, plan: &ActionPlan) -> Result<PolicyVerdict> {
        if plan.estimated_risk > self.max_risk {
            return Ok(PolicyVerdict::deny("denied").with_flag("risk_above_ceiling"));
        }
        if let Some(limit) = self.max_cost {
            if plan.estimated_cost > limit {
                return Ok(PolicyVerdict::deny("denied").with_flag("cost_above_limit"));
            }
        }
        Ok(PolicyVerdict::approve())
    }
}

/// Runs several gates; every one must approve and all flags are merged.
#[derive(Clone, Default)]
pub struct PolicyChain {
    gates: Vec<Arc<dyn PolicyGate>>,
}

impl PolicyChain {
    /// Empty chain, which approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn PolicyGate>) -> Self {
        self.gates.push(gate);
        self
    }

    /// Number of gates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    /// Whether the chain has no gates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.gates.iter().map(|gate| gate.name()).collect();
        f.debug_struct("PolicyChain").field("gates", &names).finish()
    }
}

#[async_trait]
impl PolicyGate for PolicyChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn check_plan(&self, plan: &ActionPlan) -> Result<PolicyVerdict> {
        let mut verdict = PolicyVerdict::approve();
        for gate in &self.gates {
            let next = gate.check_plan(plan).await?;
            verdict.approved &= next.approved;
            verdict.flags.extend(next.flags);
        }
        Ok(verdict)
    }
}
