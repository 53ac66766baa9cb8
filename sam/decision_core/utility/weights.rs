use crate::{
    config::UtilityConfig,
    maturity::MaturityStage,
    mental_health::Restriction,
    models::{PersonalityInfluence, UtilityWeights},
    planning::GoalKind,
};

/// Base weights modulated by stage, personality, and active interventions,
/// then renormalized to the configured total.
#[must_use]
pub fn modulated(
    config: &UtilityConfig,
    stage: MaturityStage,
    personality: &PersonalityInfluence,
    restriction: &Restriction,
    goal_kind: GoalKind,
) -> UtilityWeights {
    let base = config.base_weights;
    let stage_factors = config.stage_modulation.for_stage(stage);
    let traits = personality.clamped();
    let floor = config.min_multiplier;
    let factor = |value: f64| value.max(floor);

    let coefficients = config.personality;
    let shift = |coefficient: f64, value: f64| factor(coefficient.mul_add(value - 0.5, 1.0));

    let mut goal = base.goal
        * stage_factors.goal
        * factor(
            coefficients.social_goal.mul_add(
                traits.social - 0.5,
                coefficients
                    .creativity_goal
                    .mul_add(traits.creativity - 0.5, 1.0),
            ),
        );
    let quality = base.quality * shift(coefficients.analytical_quality, traits.analytical);
    let risk = base.risk
        * stage_factors.risk
        * shift(coefficients.assertiveness_risk, traits.assertiveness)
        * restriction.risk_weight_multiplier.max(1.0);
    let cost = base.cost * shift(coefficients.patience_cost, traits.patience);
    if goal_kind == GoalKind::Validation {
        goal *= factor(restriction.validation_goal_factor);
    }

    renormalize(
        UtilityWeights {
            goal,
            quality,
            risk,
            cost,
        },
        config.weight_total,
    )
}

/// Scales the weights so they sum to `total`.
#[must_use]
pub fn renormalize(weights: UtilityWeights, total: f64) -> UtilityWeights {
    let sum = weights.sum();
    if !(sum.is_finite() && sum > 0.0) {
        let quarter = total / 4.0;
        return UtilityWeights {
            goal: quarter,
            quality: quarter,
            risk: quarter,
            cost: quarter,
        };
    }
    let scale = total / sum;
    UtilityWeights {
        goal: weights.goal * scale,
        quality: weights.quality * scale,
        risk: weights.risk * scale,
        cost: weights.cost * scale,
    }
}
