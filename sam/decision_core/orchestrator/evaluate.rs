use crate::{
    config::EvaluationConfig,
    mental_health::{MentalHealthMetrics, MentalHealthStatus},
    models::DecodingMode,
    planning::GoalKind,
};

/// Volatility/stability signal in `[0, 1]`; higher means less stable.
#[must_use]
pub fn stability_signal(
    config: &EvaluationConfig,
    urgency: f64,
    complexity: f64,
    metrics: &MentalHealthMetrics,
    status: MentalHealthStatus,
) -> f64 {
    let mut vsp: f64 = 0.0;
    if complexity > config.high_complexity {
        vsp += config.complexity_signal;
    }
    if urgency > config.high_urgency {
        vsp += config.urgency_signal;
    }
    if status != MentalHealthStatus::Stable {
        vsp += config.unsettled_signal;
    }
    if metrics.stress > config.stressed_level {
        vsp += config.stress_signal;
    }
    if metrics.emotional_stability < config.stability_level {
        vsp += config.instability_signal;
    }
    vsp.min(1.0)
}

/// Decoding mode for the cycle.
#[must_use]
pub fn decoding_mode(
    config: &EvaluationConfig,
    urgency: f64,
    complexity: f64,
    vsp: f64,
    goal: GoalKind,
) -> DecodingMode {
    if urgency > config.crisis_urgency || vsp > config.crisis_signal {
        DecodingMode::Crisis
    } else if complexity > config.deep_complexity || goal.is_deliberative() {
        DecodingMode::Deep
    } else {
        DecodingMode::Flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calm_routine_goal_flows() {
        let config = EvaluationConfig::default();
        let metrics = MentalHealthMetrics::default();
        let vsp = stability_signal(&config, 0.3, 0.2, &metrics, MentalHealthStatus::Stable);
        assert!(vsp.abs() < f64::EPSILON);
        assert_eq!(decoding_mode(&config, 0.3, 0.2, vsp, GoalKind::Tool), DecodingMode::Flow);
        assert_eq!(decoding_mode(&config, 0.3, 0.2, vsp, GoalKind::Plan), DecodingMode::Deep);
    }

    #[test]
    fn unstable_agent_under_load_enters_crisis() {
        let config = EvaluationConfig::default();
        let metrics = MentalHealthMetrics {
            stress: 0.9,
            emotional_stability: 0.3,
            ..MentalHealthMetrics::default()
        };
        let vsp = stability_signal(&config, 0.95, 0.9, &metrics, MentalHealthStatus::Stressed);
        assert!((vsp - 0.95).abs() < 1e-9);
        assert_eq!(decoding_mode(&config, 0.5, 0.5, vsp, GoalKind::Tool), DecodingMode::Crisis);
        assert!(stability_signal(&config, 1.0, 1.0, &metrics, MentalHealthStatus::Stressed) <= 1.0);
    }

    #[test]
    fn thresholds_follow_configuration() {
        let config = EvaluationConfig {
            crisis_urgency: 0.99,
            deep_complexity: 0.95,
            complexity_signal: 0.5,
            ..EvaluationConfig::default()
        };
        let metrics = MentalHealthMetrics::default();
        let vsp = stability_signal(&config, 0.1, 0.9, &metrics, MentalHealthStatus::Stable);
        assert!((vsp - 0.5).abs() < 1e-9);
        assert_eq!(decoding_mode(&config, 0.95, 0.9, vsp, GoalKind::Tool), DecodingMode::Flow);
        let stock = EvaluationConfig::default();
        assert_eq!(decoding_mode(&stock, 0.95, 0.9, vsp, GoalKind::Tool), DecodingMode::Crisis);
    }
}
