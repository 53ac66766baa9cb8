use anyhow::Result;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::goal::GoalKind;
use crate::{
    config::PlanningConfig,
    maturity::MaturityStage,
    mental_health::detectors::normalize_goal,
    models::{ActionPlan, DecodingMode, PlanStep, PlanStrategy, StepKind},
};

/// Namespace for deterministic plan identifiers.
pub const PLAN_NAMESPACE: Uuid = Uuid::from_u128(0x5a3d_7c41_92e8_4b0f_a6d1_0c3e_8f27_b915);

/// Bound snapshot a generator must respect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningContext {
    /// Goal text.
    pub goal: String,
    /// Goal classification.
    pub goal_kind: GoalKind,
    /// Stage the bounds come from.
    pub stage: MaturityStage,
    /// Effective urgency.
    pub urgency: f64,
    /// Effective complexity.
    pub complexity: f64,
    /// Highest risk a plan may carry.
    pub risk_ceiling: f64,
    /// Highest number of steps a plan may have.
    pub max_steps: usize,
    /// Exploratory variants requested on top of the templates.
    pub diversity: usize,
    /// Decoding mode of the cycle.
    pub mode: DecodingMode,
}

impl PlanningContext {
    /// Step cap implied by an effective complexity ceiling and an optional caller cap.
    #[must_use]
    pub fn step_cap(max_complexity: f64, steps_per_complexity: f64, caller: Option<usize>) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let from_bounds = (max_complexity.clamp(0.0, 1.0) * steps_per_complexity).ceil() as usize;
        let cap = from_bounds.max(1);
        caller.map_or(cap, |limit| cap.min(limit.max(1)))
    }

    /// Deterministic identifier for a plan built from this snapshot.
    #[must_use]
    pub fn plan_id(&self, label: &str) -> Uuid {
        let key = format!(
            "{label}|{}|{}|{:.4}|{:.4}|{:.4}|{}|{}",
            normalize_goal(&self.goal),
            self.stage,
            self.urgency,
            self.complexity,
            self.risk_ceiling,
            self.max_steps,
            self.diversity,
        );
        Uuid::new_v5(&PLAN_NAMESPACE, key.as_bytes())
    }
}

/// Source of candidate plans.
///
/// Implementations must be deterministic for an identical context and must
/// not produce fallback plans; the fallback is appended separately.
pub trait PlanGenerator: Send + Sync {
    /// Produces candidates within the context bounds.
    fn generate(&self, context: &PlanningContext) -> Result<Vec<ActionPlan>>;
}

#[derive(Debug, Clone, Copy)]
struct Template {
    strategy: PlanStrategy,
    base_steps: usize,
    risk_factor: f64,
    quality: f64,
    goal_bias: f64,
}

const CONSERVATIVE: Template = Template {
    strategy: PlanStrategy::Conservative,
    base_steps: 2,
    risk_factor: 0.4,
    quality: 0.78,
    goal_bias: 0.05,
};

const BALANCED: Template = Template {
    strategy: PlanStrategy::Balanced,
    base_steps: 3,
    risk_factor: 0.7,
    quality: 0.72,
    goal_bias: 0.12,
};

const AGGRESSIVE: Template = Template {
    strategy: PlanStrategy::Aggressive,
    base_steps: 5,
    risk_factor: 1.0,
    quality: 0.62,
    goal_bias: 0.2,
};

/// Template-driven generator used by default.
#[derive(Debug, Clone)]
pub struct TemplatePlanGenerator {
    unit_cost: u64,
}

impl TemplatePlanGenerator {
    /// Creates a generator pricing steps with the configured unit cost.
    #[must_use]
    pub const fn new(config: &PlanningConfig) -> Self {
        Self {
            unit_cost: config.unit_cost,
        }
    }

    fn build(&self, context: &PlanningContext, template: Template, label: &str) -> ActionPlan {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let extra = (context.complexity.clamp(0.0, 1.0) * 4.0).round() as usize;
        let count = (template.base_steps + extra).clamp(1, context.max_steps.max(1));
        #[allow(clippy::cast_precision_loss)]
        let steps_f = count as f64;

        let ceiling = context.risk_ceiling.clamp(0.0, 1.0);
        let risk = (ceiling * template.risk_factor * 0.4f64.mul_add(context.complexity, 0.6))
            .clamp(0.0, ceiling);
        let quality = 0.02f64.mul_add(steps_f, template.quality).min(0.95);
        let goal_satisfaction = 0.07f64
            .mul_add(steps_f, 0.45 + template.goal_bias)
            .min(0.95);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let cost = (steps_f * self.unit_cost as f64 * (1.0 + context.complexity.clamp(0.0, 1.0)))
            .round() as u64;

        ActionPlan {
            id: context.plan_id(label),
            strategy: template.strategy,
            steps: steps_for(template.strategy, count, &context.goal),
            estimated_cost: cost,
            estimated_risk: risk,
            estimated_quality: quality,
            estimated_goal_satisfaction: goal_satisfaction,
        }
    }

    fn exploratory(&self, context: &PlanningContext, variant: usize) -> ActionPlan {
        let label = format!("exploratory-{variant}");
        let seed_id = context.plan_id(&format!("seed-{label}"));
        let mut seed = [0_u8; 8];
        seed.copy_from_slice(&seed_id.as_bytes()[..8]);
        let mut rng = SmallRng::seed_from_u64(u64::from_le_bytes(seed));
        let template = Template {
            strategy: PlanStrategy::Exploratory,
            base_steps: rng.gen_range(1..=context.max_steps.max(1)),
            risk_factor: rng.gen_range(0.3..0.9),
            quality: rng.gen_range(0.55..0.85),
            goal_bias: rng.gen_range(0.0..0.2),
        };
        self.build(context, template, &label)
    }
}

impl Default for TemplatePlanGenerator {
    fn default() -> Self {
        Self::new(&PlanningConfig::default())
    }
}

impl PlanGenerator for TemplatePlanGenerator {
    fn generate(&self, context: &PlanningContext) -> Result<Vec<ActionPlan>> {
        let mut plans = vec![
            self.build(context, CONSERVATIVE, "conservative"),
            self.build(context, BALANCED, "balanced"),
        ];
        if context.stage >= MaturityStage::Adolescent {
            plans.push(self.build(context, AGGRESSIVE, "aggressive"));
        }
        plans.extend((0..context.diversity).map(|variant| self.exploratory(context, variant)));
        Ok(plans)
    }
}

fn steps_for(strategy: PlanStrategy, count: usize, goal: &str) -> Vec<PlanStep> {
    (0..count)
        .map(|index| {
            let last = index + 1 == count;
            let kind = match strategy {
                PlanStrategy::Conservative if last && count > 1 => StepKind::Validate,
                PlanStrategy::Exploratory if index % 2 == 0 => StepKind::Tool,
                PlanStrategy::Exploratory => StepKind::Llm,
                _ if index % 2 == 0 => StepKind::Llm,
                _ => StepKind::Tool,
            };
            let verb = match kind {
                StepKind::Llm => "reason about",
                StepKind::Tool => "run tools for",
                StepKind::Validate => "validate the result of",
                StepKind::Wait => "wait on",
                StepKind::Escalate => "escalate",
            };
            PlanStep {
                index,
                kind,
                description: format!("{verb} '{goal}' ({}/{count})", index + 1),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(stage: MaturityStage, diversity: usize) -> PlanningContext {
        let bounds = stage.bounds();
        PlanningContext {
            goal: "X".into(),
            goal_kind: GoalKind::Tool,
            stage,
            urgency: 0.3,
            complexity: 0.2,
            risk_ceiling: bounds.risk_tolerance,
            max_steps: PlanningContext::step_cap(bounds.max_complexity, 8.0, None),
            diversity,
            mode: DecodingMode::Flow,
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let generator = TemplatePlanGenerator::default();
        let ctx = context(MaturityStage::Child, 2);
        let first = generator.generate(&ctx).unwrap();
        let second = generator.generate(&ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn aggressive_plans_need_adolescence() {
        let generator = TemplatePlanGenerator::default();
        let infant = generator.generate(&context(MaturityStage::Infant, 0)).unwrap();
        assert!(infant.iter().all(|plan| plan.strategy != PlanStrategy::Aggressive));
        let adult = generator.generate(&context(MaturityStage::Adult, 0)).unwrap();
        assert!(adult.iter().any(|plan| plan.strategy == PlanStrategy::Aggressive));
    }

    #[test]
    fn plans_respect_the_bound_snapshot() {
        let generator = TemplatePlanGenerator::default();
        for stage in MaturityStage::ALL {
            let ctx = context(stage, 3);
            for plan in generator.generate(&ctx).unwrap() {
                assert!(plan.estimated_risk <= ctx.risk_ceiling + 1e-12);
                assert!(!plan.steps.is_empty() && plan.steps.len() <= ctx.max_steps);
                assert!(plan.estimates_in_range());
                assert!(plan.estimated_cost > 0);
            }
        }
    }

    #[test]
    fn diversity_adds_distinct_exploratory_plans() {
        let generator = TemplatePlanGenerator::default();
        let plans = generator.generate(&context(MaturityStage::Infant, 2)).unwrap();
        let exploratory: Vec<_> = plans
            .iter()
            .filter(|plan| plan.strategy == PlanStrategy::Exploratory)
            .collect();
        assert_eq!(exploratory.len(), 2);
        assert_ne!(exploratory[0].id, exploratory[1].id);
    }

    #[test]
    fn step_cap_honours_caller_limit() {
        assert_eq!(PlanningContext::step_cap(0.3, 8.0, None), 3);
        assert_eq!(PlanningContext::step_cap(1.0, 8.0, Some(2)), 2);
        assert_eq!(PlanningContext::step_cap(0.0, 8.0, Some(0)), 1);
    }
}
