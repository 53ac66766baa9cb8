//! Plan scoring.
//!
//! `U = wg·G + wq·Q − wr·R − ws·S` where `S` is the plan cost divided by the
//! configured cost scale and clamped to `[0, 1]`.

use std::cmp::Ordering;

use crate::{
    config::UtilityConfig,
    maturity::MaturityStage,
    mental_health::Restriction,
    models::{
        ActionPlan, FactorBreakdown, FactorContribution, PersonalityInfluence, PlanStrategy,
        ScoredCandidate, Tone, UtilityWeights,
    },
    planning::GoalKind,
};

/// Weight modulation.
pub mod weights;

/// Scores candidate plans under modulated weights.
#[derive(Debug, Clone, Default)]
pub struct UtilityEngine {
    config: UtilityConfig,
}

impl UtilityEngine {
    /// Creates an engine with the given weights and scale.
    #[must_use]
    pub const fn new(config: UtilityConfig) -> Self {
        Self { config }
    }

    /// Modulated, renormalized weights for one cycle.
    #[must_use]
    pub fn weights(
        &self,
        stage: MaturityStage,
        personality: &PersonalityInfluence,
        restriction: &Restriction,
        goal_kind: GoalKind,
    ) -> UtilityWeights {
        weights::modulated(&self.config, stage, personality, restriction, goal_kind)
    }

    /// Scores a single plan.
    #[must_use]
    pub fn score(
        &self,
        plan: &ActionPlan,
        weights: &UtilityWeights,
        personality: &PersonalityInfluence,
    ) -> ScoredCandidate {
        #[allow(clippy::cast_precision_loss)]
        let cost = (plan.estimated_cost as f64 / self.config.cost_scale).clamp(0.0, 1.0);
        let goal = contribution(plan.estimated_goal_satisfaction, weights.goal, 1.0);
        let quality = contribution(plan.estimated_quality, weights.quality, 1.0);
        let risk = contribution(plan.estimated_risk, weights.risk, -1.0);
        let cost = contribution(cost, weights.cost, -1.0);
        let utility =
            goal.contribution + quality.contribution + risk.contribution + cost.contribution;
        let factors = FactorBreakdown {
            goal_satisfaction: goal,
            quality,
            risk,
            cost,
        };
        ScoredCandidate {
            plan_id: plan.id,
            strategy: plan.strategy,
            estimated_cost: plan.estimated_cost,
            utility,
            explanation: explain(&factors, utility, plan.strategy, personality),
            factors,
        }
    }

    /// Scores every plan and returns them best first.
    ///
    /// Ties break on goal satisfaction (higher first), risk (lower first),
    /// cost (lower first), and finally plan id.
    #[must_use]
    pub fn rank(
        &self,
        plans: &[ActionPlan],
        weights: &UtilityWeights,
        personality: &PersonalityInfluence,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = plans
            .iter()
            .map(|plan| self.score(plan, weights, personality))
            .collect();
        scored.sort_by(compare_candidates);
        scored
    }
}

fn contribution(value: f64, weight: f64, sign: f64) -> FactorContribution {
    let value = value.clamp(0.0, 1.0);
    FactorContribution {
        value,
        weight,
        contribution: sign * weight * value,
    }
}

/// Scores closer than this compare equal and fall through to the tie-breakers.
const SCORE_RESOLUTION: f64 = 1e-9;

fn quantized(value: f64) -> f64 {
    (value / SCORE_RESOLUTION).round()
}

fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    quantized(b.utility)
        .total_cmp(&quantized(a.utility))
        .then_with(|| {
            quantized(b.factors.goal_satisfaction.value)
                .total_cmp(&quantized(a.factors.goal_satisfaction.value))
        })
        .then_with(|| quantized(a.factors.risk.value).total_cmp(&quantized(b.factors.risk.value)))
        .then_with(|| a.estimated_cost.cmp(&b.estimated_cost))
        .then_with(|| a.plan_id.cmp(&b.plan_id))
}

fn explain(
    factors: &FactorBreakdown,
    utility: f64,
    strategy: PlanStrategy,
    personality: &PersonalityInfluence,
) -> String {
    let mut notes = Vec::new();
    let goal = factors.goal_satisfaction.value;
    if goal > 0.7 {
        notes.push("high goal satisfaction");
    } else if goal < 0.4 {
        notes.push("low goal satisfaction");
    }
    let quality = factors.quality.value;
    if quality > 0.7 {
        notes.push("high quality");
    } else if quality < 0.4 {
        notes.push("low quality");
    }
    let risk = factors.risk.value;
    if risk > 0.6 {
        notes.push("high risk");
    } else if risk < 0.3 {
        notes.push("low risk");
    }
    let cost = factors.cost.value;
    if cost > 0.7 {
        notes.push("high resource cost");
    } else if cost < 0.3 {
        notes.push("low resource cost");
    }

    let overall = if utility > 0.7 {
        "high utility"
    } else if utility > 0.4 {
        "moderate utility"
    } else {
        "low utility"
    };

    let mut text = match (personality.tone, notes.is_empty()) {
        (Tone::Direct, true) => format!("{strategy}: {overall}"),
        (Tone::Direct, false) => format!("{strategy}: {overall}; {}", notes.join(", ")),
        (_, true) => format!("{overall} with balanced characteristics"),
        (_, false) => format!("{overall} due to {}", notes.join(", ")),
    };
    let bold = matches!(strategy, PlanStrategy::Aggressive | PlanStrategy::Exploratory);
    if bold && personality.clamped().humor >= 0.8 {
        text.push_str(" (fortune favours the bold)");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanStep, StepKind};
    use uuid::Uuid;

    fn plan(id: u128, goal: f64, quality: f64, risk: f64, cost: u64) -> ActionPlan {
        ActionPlan {
            id: Uuid::from_u128(id),
            strategy: PlanStrategy::Balanced,
            steps: vec![PlanStep {
                index: 0,
                kind: StepKind::Llm,
                description: "think".into(),
            }],
            estimated_cost: cost,
            estimated_risk: risk,
            estimated_quality: quality,
            estimated_goal_satisfaction: goal,
        }
    }

    fn even_weights() -> UtilityWeights {
        UtilityWeights {
            goal: 0.25,
            quality: 0.25,
            risk: 0.25,
            cost: 0.25,
        }
    }

    #[test]
    fn utility_follows_the_formula() {
        let engine = UtilityEngine::default();
        let weights = UtilityWeights {
            goal: 0.4,
            quality: 0.3,
            risk: 0.2,
            cost: 0.1,
        };
        let scored = engine.score(
            &plan(1, 0.8, 0.7, 0.2, 50),
            &weights,
            &PersonalityInfluence::neutral(),
        );
        let expected = 0.4 * 0.8 + 0.3 * 0.7 - 0.2 * 0.2 - 0.1 * 0.5;
        assert!((scored.utility - expected).abs() < 1e-12);
        assert!((scored.factors.cost.value - 0.5).abs() < 1e-12);
        assert!(scored.factors.risk.contribution < 0.0);
        assert_eq!(
            scored.explanation,
            "moderate utility due to high goal satisfaction, low risk"
        );
    }

    #[test]
    fn cost_saturates_at_scale() {
        let engine = UtilityEngine::default();
        let scored = engine.score(
            &plan(1, 0.5, 0.5, 0.5, 10_000),
            &even_weights(),
            &PersonalityInfluence::neutral(),
        );
        assert!((scored.factors.cost.value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ties_break_deterministically() {
        let engine = UtilityEngine::default();
        let neutral = PersonalityInfluence::neutral();
        // Same utility, higher goal satisfaction wins.
        let a = plan(9, 0.75, 0.25, 0.0, 0);
        let b = plan(8, 0.5, 0.5, 0.0, 0);
        let ranked = engine.rank(&[b.clone(), a.clone()], &even_weights(), &neutral);
        assert_eq!(ranked[0].plan_id, a.id);

        // Fully identical estimates fall back to the id.
        let c = plan(2, 0.5, 0.5, 0.1, 10);
        let d = plan(1, 0.5, 0.5, 0.1, 10);
        let ranked = engine.rank(&[c, d.clone()], &even_weights(), &neutral);
        assert_eq!(ranked[0].plan_id, d.id);
    }

    #[test]
    fn rounding_noise_does_not_decide_the_ranking() {
        let engine = UtilityEngine::default();
        let neutral = PersonalityInfluence::neutral();
        let weights = even_weights();
        let mut satisfying = engine.score(&plan(9, 0.75, 0.25, 0.0, 0), &weights, &neutral);
        let mut plain = engine.score(&plan(8, 0.5, 0.5, 0.0, 0), &weights, &neutral);
        satisfying.utility = 0.1 + 0.2;
        plain.utility = satisfying.utility + 1e-13;
        assert_eq!(compare_candidates(&satisfying, &plain), Ordering::Less);

        plain.utility = satisfying.utility + 1e-6;
        assert_eq!(compare_candidates(&satisfying, &plain), Ordering::Greater);
    }

    #[test]
    fn direct_tone_shortens_explanations() {
        let engine = UtilityEngine::default();
        let direct = PersonalityInfluence {
            tone: Tone::Direct,
            ..PersonalityInfluence::neutral()
        };
        let scored = engine.score(&plan(3, 0.5, 0.5, 0.5, 50), &even_weights(), &direct);
        assert!(scored.explanation.starts_with("balanced: low utility"));
    }
}
