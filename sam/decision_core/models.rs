//! Records exchanged across the decision cycle: requests, plans, traces, and responses.

use std::{collections::BTreeSet, fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::DecisionError,
    maturity::{MaturityProfile, MaturityStage},
    mental_health::{InterventionKind, MentalHealthMetrics, MentalHealthState, MentalHealthStatus},
    orchestrator::machine::CyclePhase,
    planning::goal::GoalKind,
};

/// Identity of the agent whose developmental state a cycle reads and updates.
pub type AgentId = String;

/// Agent used when a request does not name one.
pub const DEFAULT_AGENT: &str = "default";

/// Categorical communication tone.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// No tonal preference.
    #[default]
    Neutral,
    /// Friendly and encouraging.
    Warm,
    /// Precise and reserved.
    Formal,
    /// Light-hearted.
    Playful,
    /// Blunt and brief.
    Direct,
}

/// Trait vector supplied by the personality source for one request.
///
/// The core only reads it; numeric traits are clamped into `[0, 1]` before use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonalityInfluence {
    /// Communication tone.
    #[serde(default)]
    pub tone: Tone,
    /// Willingness to accept risk.
    pub assertiveness: f64,
    /// Tolerance for slow, expensive plans.
    pub patience: f64,
    /// Preference for levity.
    pub humor: f64,
    /// Preference for novel approaches.
    pub creativity: f64,
    /// Preference for rigor and quality.
    pub analytical: f64,
    /// Preference for outcomes that serve others.
    pub social: f64,
}

impl PersonalityInfluence {
    /// Neutral vector (every numeric trait at 0.5).
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            tone: Tone::Neutral,
            assertiveness: 0.5,
            patience: 0.5,
            humor: 0.5,
            creativity: 0.5,
            analytical: 0.5,
            social: 0.5,
        }
    }

    /// Returns a copy with every numeric trait clamped into `[0, 1]`.
    ///
    /// Non-finite traits fall back to the neutral 0.5.
    #[must_use]
    pub fn clamped(self) -> Self {
        let fix = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.5
            }
        };
        Self {
            tone: self.tone,
            assertiveness: fix(self.assertiveness),
            patience: fix(self.patience),
            humor: fix(self.humor),
            creativity: fix(self.creativity),
            analytical: fix(self.analytical),
            social: fix(self.social),
        }
    }
}

impl Default for PersonalityInfluence {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Explicit caller constraints tightening the stage bounds for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestConstraints {
    /// Maximum plan risk the caller accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk: Option<f64>,
    /// Maximum number of plan steps the caller accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

/// Decision request accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRequest {
    /// Agent whose state is consulted and updated.
    #[serde(default = "default_agent")]
    pub agent_id: AgentId,
    /// Goal text.
    pub goal: String,
    /// Urgency between 0 and 1.
    pub urgency: f64,
    /// Complexity between 0 and 1.
    pub complexity: f64,
    /// Resource budget in cost units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u64>,
    /// Wall-clock limit in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<f64>,
    /// Personality override for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<PersonalityInfluence>,
    /// Explicit constraints.
    #[serde(default)]
    pub constraints: RequestConstraints,
}

fn default_agent() -> AgentId {
    DEFAULT_AGENT.into()
}

impl DecisionRequest {
    /// Creates a request with mid-range urgency and complexity.
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            agent_id: default_agent(),
            goal: goal.into(),
            urgency: 0.5,
            complexity: 0.5,
            budget: None,
            time_limit_secs: None,
            personality: None,
            constraints: RequestConstraints::default(),
        }
    }

    /// Targets a specific agent.
    #[must_use]
    pub fn for_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_id = agent.into();
        self
    }

    /// Sets the urgency.
    #[must_use]
    pub const fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency = urgency;
        self
    }

    /// Sets the complexity.
    #[must_use]
    pub const fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    /// Sets the budget in cost units.
    #[must_use]
    pub const fn with_budget(mut self, budget: u64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_secs = Some(limit.as_secs_f64());
        self
    }

    /// Supplies a personality override.
    #[must_use]
    pub const fn with_personality(mut self, personality: PersonalityInfluence) -> Self {
        self.personality = Some(personality);
        self
    }

    /// Supplies explicit constraints.
    #[must_use]
    pub const fn with_constraints(mut self, constraints: RequestConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Checks that the request is well formed and returns its time limit.
    ///
    /// Out-of-range urgency or complexity is not an error; those are clamped
    /// during sensing. Missing goals and non-numeric inputs are.
    pub fn validate(&self) -> Result<Option<Duration>, DecisionError> {
        if self.goal.trim().is_empty() {
            return Err(DecisionError::Validation("goal is missing".into()));
        }
        if self.agent_id.trim().is_empty() {
            return Err(DecisionError::Validation("agent id is empty".into()));
        }
        if !self.urgency.is_finite() {
            return Err(DecisionError::Validation(format!(
                "urgency is not a number: {}",
                self.urgency
            )));
        }
        if !self.complexity.is_finite() {
            return Err(DecisionError::Validation(format!(
                "complexity is not a number: {}",
                self.complexity
            )));
        }
        if let Some(max_risk) = self.constraints.max_risk {
            if !max_risk.is_finite() {
                return Err(DecisionError::Validation("max_risk is not a number".into()));
            }
        }
        self.time_limit_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    DecisionError::Validation(format!("time limit must be non-negative: {secs}"))
                })
            })
            .transpose()
    }
}

/// Generation strategy a plan was built with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    /// Few steps, lowest risk.
    Conservative,
    /// Middle ground.
    Balanced,
    /// Many steps, highest risk the stage tolerates.
    Aggressive,
    /// Seeded variant used to diversify the candidate set.
    Exploratory,
    /// Mandatory minimal-risk plan.
    Fallback,
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Balanced => write!(f, "balanced"),
            Self::Aggressive => write!(f, "aggressive"),
            Self::Exploratory => write!(f, "exploratory"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Kind of work a plan step performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Model reasoning or drafting.
    Llm,
    /// External tool invocation.
    Tool,
    /// Self-check of earlier output.
    Validate,
    /// Deliberate pause.
    Wait,
    /// Hand the goal to a supervisor.
    Escalate,
}

/// One ordered step of an action plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Position within the plan, starting at zero.
    pub index: usize,
    /// Step kind.
    pub kind: StepKind,
    /// Operator-readable description.
    pub description: String,
}

/// Candidate action plan with its estimates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPlan {
    /// Deterministic identifier.
    pub id: Uuid,
    /// Strategy used to build the plan.
    pub strategy: PlanStrategy,
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
    /// Estimated cost in budget units.
    pub estimated_cost: u64,
    /// Estimated risk between 0 and 1.
    pub estimated_risk: f64,
    /// Estimated quality between 0 and 1.
    pub estimated_quality: f64,
    /// Estimated goal satisfaction between 0 and 1.
    pub estimated_goal_satisfaction: f64,
}

impl ActionPlan {
    /// Whether this is the mandatory fallback plan.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.strategy == PlanStrategy::Fallback
    }

    /// Whether every estimate is finite and inside `[0, 1]`.
    #[must_use]
    pub fn estimates_in_range(&self) -> bool {
        [
            self.estimated_risk,
            self.estimated_quality,
            self.estimated_goal_satisfaction,
        ]
        .iter()
        .all(|value| value.is_finite() && (0.0..=1.0).contains(value))
    }
}

/// Decoding mode tag recorded on every trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecodingMode {
    /// Fast, routine responses.
    Flow,
    /// Thorough analysis.
    Deep,
    /// High-stakes or unstable conditions.
    Crisis,
}

/// Utility weights applied to the four factors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UtilityWeights {
    /// Goal-satisfaction weight.
    pub goal: f64,
    /// Quality weight.
    pub quality: f64,
    /// Risk weight.
    pub risk: f64,
    /// Cost weight.
    pub cost: f64,
}

impl UtilityWeights {
    /// Sum of the four weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.goal + self.quality + self.risk + self.cost
    }
}

/// Value, weight, and signed contribution of one factor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FactorContribution {
    /// Factor value in `[0, 1]`.
    pub value: f64,
    /// Weight applied.
    pub weight: f64,
    /// Signed contribution to utility.
    pub contribution: f64,
}

/// Per-factor utility breakdown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FactorBreakdown {
    /// Goal satisfaction (G).
    pub goal_satisfaction: FactorContribution,
    /// Quality (Q).
    pub quality: FactorContribution,
    /// Risk (R).
    pub risk: FactorContribution,
    /// Normalized cost (S).
    pub cost: FactorContribution,
}

/// Candidate as listed on the trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    /// Plan identifier.
    pub plan_id: Uuid,
    /// Plan strategy.
    pub strategy: PlanStrategy,
    /// Raw estimated cost, kept for tie-breaking.
    pub estimated_cost: u64,
    /// Scalar utility.
    pub utility: f64,
    /// Per-factor breakdown.
    pub factors: FactorBreakdown,
    /// Human-readable explanation.
    pub explanation: String,
}

/// Input dimension a clamp applied to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClampDimension {
    /// Request urgency.
    Urgency,
    /// Request complexity.
    Complexity,
}

/// A request value that was lowered (or raised into range) before use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClampRecord {
    /// Clamped dimension.
    pub dimension: ClampDimension,
    /// Value the caller sent.
    pub requested: f64,
    /// Value the cycle used.
    pub applied: f64,
}

/// Immutable audit record of one decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTrace {
    /// Trace identifier.
    pub id: Uuid,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Agent the cycle ran for.
    pub agent_id: AgentId,
    /// Volatility/stability signal.
    pub vsp: f64,
    /// Decoding mode tag.
    pub mode: DecodingMode,
    /// Stage sensed at cycle start.
    pub stage: MaturityStage,
    /// Goal classification.
    pub goal_kind: GoalKind,
    /// Every scored candidate, best first.
    pub candidates: Vec<ScoredCandidate>,
    /// Selected plan.
    pub winner: Uuid,
    /// Selection reasons.
    pub reasons: Vec<String>,
    /// Personality vector used for weighting.
    pub personality_weights: PersonalityInfluence,
    /// Utility weights after modulation.
    pub utility_weights: UtilityWeights,
    /// Policy and outcome flags.
    pub policy_flags: BTreeSet<String>,
    /// Input clamps applied during sensing.
    pub clamps: Vec<ClampRecord>,
    /// Supervision level in force for the cycle.
    pub supervision_level: f64,
    /// Directives that shaped this cycle.
    pub active_interventions: Vec<InterventionKind>,
    /// Directives triggered by this cycle's behavioral sample.
    pub triggered_interventions: Vec<InterventionKind>,
    /// State machine path taken.
    pub phases: Vec<CyclePhase>,
    /// Whether a resource limit (budget or time) forced the fallback.
    pub budget_exceeded: bool,
    /// Whether the time limit forced the fallback.
    pub time_exceeded: bool,
    /// Whether the fallback plan won.
    pub fallback_used: bool,
}

impl DecisionTrace {
    /// Scored entry of the winning plan.
    #[must_use]
    pub fn winner_candidate(&self) -> Option<&ScoredCandidate> {
        self.candidates
            .iter()
            .find(|candidate| candidate.plan_id == self.winner)
    }

    /// Whether the cycle triggered the given directive.
    #[must_use]
    pub fn triggered(&self, kind: InterventionKind) -> bool {
        self.triggered_interventions.contains(&kind)
    }
}

/// Mental-health view returned to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MentalHealthSnapshot {
    /// Derived status.
    pub status: MentalHealthStatus,
    /// Raw metrics.
    pub metrics: MentalHealthMetrics,
}

/// Result handed back to the caller for execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionResponse {
    /// Selected plan identifier.
    pub plan_id: Uuid,
    /// Selected plan, handed off for execution.
    pub plan: ActionPlan,
    /// Confidence between 0 and 1.
    pub confidence: f64,
    /// Trace identifier.
    pub trace_id: Uuid,
    /// Stage after learning.
    pub stage: MaturityStage,
    /// Whether a resource limit (budget or time) forced the fallback.
    pub budget_exceeded: bool,
    /// Whether the time limit forced the fallback.
    pub time_exceeded: bool,
    /// Whether the fallback plan was selected.
    pub fallback_used: bool,
    /// Whether a collaborator failed during the cycle.
    pub degraded: bool,
    /// Mental-health snapshot after learning.
    pub mental_health: MentalHealthSnapshot,
    /// Warnings collected during the cycle.
    pub warnings: Vec<String>,
    /// Recommendations for the current mental-health status.
    pub recommendations: Vec<String>,
}

/// Per-agent state kept by the state store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    /// Developmental profile.
    pub maturity: MaturityProfile,
    /// Behavioral metrics and directives.
    pub mental_health: MentalHealthState,
}

impl AgentState {
    /// Fresh state starting at the given stage.
    #[must_use]
    pub fn at_stage(stage: MaturityStage, now: DateTime<Utc>) -> Self {
        Self {
            maturity: MaturityProfile::new(stage, now),
            mental_health: MentalHealthState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_goal() {
        let err = DecisionRequest::new("   ").validate().unwrap_err();
        assert!(matches!(err, DecisionError::Validation(_)));
    }

    #[test]
    fn validation_accepts_out_of_range_levels() {
        let request = DecisionRequest::new("summarize report")
            .with_urgency(1.7)
            .with_complexity(-0.2)
            .with_time_limit(Duration::from_millis(1500));
        let limit = request.validate().unwrap();
        assert_eq!(limit, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn validation_rejects_negative_time_limit_and_nan() {
        let mut request = DecisionRequest::new("plan trip");
        request.time_limit_secs = Some(-1.0);
        assert!(request.validate().is_err());
        let request = DecisionRequest::new("plan trip").with_urgency(f64::NAN);
        assert!(request.validate().is_err());
    }

    #[test]
    fn personality_clamps_traits() {
        let wild = PersonalityInfluence {
            assertiveness: 3.0,
            analytical: f64::NAN,
            ..PersonalityInfluence::neutral()
        };
        let fixed = wild.clamped();
        assert!((fixed.assertiveness - 1.0).abs() < f64::EPSILON);
        assert!((fixed.analytical - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: DecisionRequest =
            serde_json::from_str(r#"{ "goal": "find paper", "urgency": 0.2, "complexity": 0.4 }"#)
                .unwrap();
        assert_eq!(request.agent_id, DEFAULT_AGENT);
        assert!(request.budget.is_none());
        assert_eq!(request.constraints, RequestConstraints::default());
    }
}
