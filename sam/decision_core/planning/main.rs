//! Candidate plan generation and the mandatory fallback plan.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;
use uuid::Uuid;

use crate::{
    config::PlanningConfig,
    errors::CycleFault,
    models::{ActionPlan, PlanStep, PlanStrategy, StepKind},
};

/// Plan generators.
pub mod generator;
/// Goal classification.
pub mod goal;

pub use generator::{PlanGenerator, PlanningContext, TemplatePlanGenerator};
pub use goal::GoalKind;

/// Candidates handed to scoring, with the fallback always last.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    /// Usable plans followed by the fallback.
    pub plans: Vec<ActionPlan>,
    /// Identifier of the fallback plan.
    pub fallback_id: Uuid,
    /// Generated plans dropped for violating the bounds.
    pub filtered: usize,
    /// Why generation produced nothing usable, if it did not.
    pub fault: Option<CycleFault>,
}

/// Builds the minimal-risk plan for a context.
///
/// It has zero cost and a risk no higher than the safe ceiling regardless of
/// stage or personality.
#[must_use]
pub fn fallback_plan(context: &PlanningContext, config: &PlanningConfig) -> ActionPlan {
    ActionPlan {
        id: context.plan_id("fallback"),
        strategy: PlanStrategy::Fallback,
        steps: vec![PlanStep {
            index: 0,
            kind: StepKind::Escalate,
            description: format!("defer '{}' and request supervision", context.goal),
        }],
        estimated_cost: 0,
        estimated_risk: config.fallback_risk.min(config.safe_risk_ceiling).max(0.0),
        estimated_quality: config.fallback_quality,
        estimated_goal_satisfaction: config.fallback_goal_satisfaction,
    }
}

/// Runs the generator, drops out-of-bounds plans, caps the count, and appends the fallback.
///
/// Generator errors and panics are contained here and reported as the set's fault.
pub fn assemble_candidates(
    generator: &dyn PlanGenerator,
    context: &PlanningContext,
    config: &PlanningConfig,
) -> CandidateSet {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(context)));
    let (mut plans, mut fault) = match outcome {
        Ok(Ok(plans)) => (plans, None),
        Ok(Err(err)) => (Vec::new(), Some(CycleFault::GenerationFailed(format!("{err:#}")))),
        Err(_) => (Vec::new(), Some(CycleFault::GeneratorPanicked)),
    };

    let generated = plans.len();
    let mut seen = Vec::with_capacity(generated);
    plans.retain(|plan| {
        let keep = within_bounds(plan, context) && !seen.contains(&plan.id);
        if keep {
            seen.push(plan.id);
        }
        keep
    });
    let filtered = generated - plans.len();
    if filtered > 0 {
        warn!(filtered, "dropped candidate plans outside the bounds");
    }
    plans.truncate(config.max_candidates);
    if plans.is_empty() && fault.is_none() {
        fault = Some(CycleFault::NoCandidates);
    }

    let fallback = fallback_plan(context, config);
    let fallback_id = fallback.id;
    plans.push(fallback);
    CandidateSet {
        plans,
        fallback_id,
        filtered,
        fault,
    }
}

fn within_bounds(plan: &ActionPlan, context: &PlanningContext) -> bool {
    !plan.is_fallback()
        && plan.estimates_in_range()
        && plan.estimated_risk <= context.risk_ceiling + f64::EPSILON
        && !plan.steps.is_empty()
        && plan.steps.len() <= context.max_steps
}
