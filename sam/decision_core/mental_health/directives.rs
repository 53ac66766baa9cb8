use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DirectiveTuning;

/// Kinds of behavioral intervention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Diversify plans and raise supervision after a repeated goal streak.
    BreakLoop,
    /// Down-weight validation-seeking goals.
    DampenValidation,
    /// Cap stimulation while stress is high.
    ReduceStimulation,
    /// Stronger caps while burnout risk is high.
    BurnoutRelief,
}

impl fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BreakLoop => write!(f, "break_loop"),
            Self::DampenValidation => write!(f, "dampen_validation"),
            Self::ReduceStimulation => write!(f, "reduce_stimulation"),
            Self::BurnoutRelief => write!(f, "burnout_relief"),
        }
    }
}

/// Adjustments one directive imposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Restriction {
    /// Complexity cap.
    pub max_complexity: Option<f64>,
    /// Urgency cap.
    pub max_urgency: Option<f64>,
    /// Multiplier on the risk weight.
    pub risk_weight_multiplier: f64,
    /// Extra exploratory candidates requested from the generator.
    pub extra_diversity: usize,
    /// Supervision added on top of the stage level.
    pub supervision_boost: f64,
    /// Goal weight factor for validation-seeking goals.
    pub validation_goal_factor: f64,
    /// Recommended planning time factor.
    pub planning_time_factor: f64,
}

impl Restriction {
    /// A restriction that changes nothing.
    pub const NONE: Self = Self {
        max_complexity: None,
        max_urgency: None,
        risk_weight_multiplier: 1.0,
        extra_diversity: 0,
        supervision_boost: 0.0,
        validation_goal_factor: 1.0,
        planning_time_factor: 1.0,
    };

    /// Restriction carried by a directive of `kind`.
    #[must_use]
    pub const fn for_kind(kind: InterventionKind, tuning: &DirectiveTuning) -> Self {
        match kind {
            InterventionKind::BreakLoop => Self {
                extra_diversity: tuning.break_loop_diversity,
                supervision_boost: tuning.break_loop_supervision,
                ..Self::NONE
            },
            InterventionKind::DampenValidation => Self {
                validation_goal_factor: tuning.validation_goal_factor,
                ..Self::NONE
            },
            InterventionKind::ReduceStimulation => Self {
                max_complexity: Some(tuning.stimulation_max_complexity),
                max_urgency: Some(tuning.stimulation_max_urgency),
                risk_weight_multiplier: tuning.stimulation_risk_multiplier,
                planning_time_factor: tuning.stimulation_planning_factor,
                ..Self::NONE
            },
            InterventionKind::BurnoutRelief => Self {
                max_complexity: Some(tuning.burnout_max_complexity),
                max_urgency: Some(tuning.burnout_max_urgency),
                risk_weight_multiplier: tuning.burnout_risk_multiplier,
                planning_time_factor: tuning.burnout_planning_factor,
                ..Self::NONE
            },
        }
    }
}

/// Immutable overlay on the decision constraints for a number of cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionDirective {
    /// Directive kind.
    pub kind: InterventionKind,
    /// Cycle whose sample triggered the directive.
    pub issued_cycle: u64,
    /// Last cycle the directive applies to.
    pub expires_after_cycle: u64,
    /// Adjustments imposed.
    pub restriction: Restriction,
    /// Operator-readable trigger description.
    pub reason: String,
}

impl InterventionDirective {
    /// Directive covering the `duration` cycles after `issued_cycle`.
    #[must_use]
    pub fn new(
        kind: InterventionKind,
        issued_cycle: u64,
        duration: u64,
        tuning: &DirectiveTuning,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            issued_cycle,
            expires_after_cycle: issued_cycle.saturating_add(duration),
            restriction: Restriction::for_kind(kind, tuning),
            reason: reason.into(),
        }
    }

    /// Whether the directive shapes the given cycle.
    #[must_use]
    pub const fn is_active_at(&self, cycle: u64) -> bool {
        cycle > self.issued_cycle && cycle <= self.expires_after_cycle
    }
}

/// Most-restrictive composition of every active directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveRestrictions {
    /// Kinds in force, sorted.
    pub kinds: Vec<InterventionKind>,
    /// Combined restriction.
    pub combined: Restriction,
}

impl ActiveRestrictions {
    /// Folds directives into one restriction, keeping the strictest value per dimension.
    pub fn compose<'a>(directives: impl IntoIterator<Item = &'a InterventionDirective>) -> Self {
        let mut kinds = Vec::new();
        let mut combined = Restriction::NONE;
        for directive in directives {
            let next = directive.restriction;
            combined.max_complexity = min_cap(combined.max_complexity, next.max_complexity);
            combined.max_urgency = min_cap(combined.max_urgency, next.max_urgency);
            combined.risk_weight_multiplier = combined
                .risk_weight_multiplier
                .max(next.risk_weight_multiplier);
            combined.extra_diversity = combined.extra_diversity.max(next.extra_diversity);
            combined.supervision_boost = combined.supervision_boost.max(next.supervision_boost);
            combined.validation_goal_factor = combined
                .validation_goal_factor
                .min(next.validation_goal_factor);
            combined.planning_time_factor = combined
                .planning_time_factor
                .max(next.planning_time_factor);
            kinds.push(directive.kind);
        }
        kinds.sort_unstable();
        kinds.dedup();
        Self { kinds, combined }
    }

    /// Whether a directive of `kind` is in force.
    #[must_use]
    pub fn contains(&self, kind: InterventionKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl Default for ActiveRestrictions {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            combined: Restriction::NONE,
        }
    }
}

fn min_cap(current: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (current, next) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_window_is_half_open() {
        let tuning = DirectiveTuning::default();
        let directive =
            InterventionDirective::new(InterventionKind::BreakLoop, 6, 3, &tuning, "loop");
        assert!(!directive.is_active_at(6));
        assert!(directive.is_active_at(7));
        assert!(directive.is_active_at(9));
        assert!(!directive.is_active_at(10));
    }

    #[test]
    fn composition_keeps_most_restrictive_values() {
        let tuning = DirectiveTuning::default();
        let stress =
            InterventionDirective::new(InterventionKind::ReduceStimulation, 1, 5, &tuning, "");
        let burnout =
            InterventionDirective::new(InterventionKind::BurnoutRelief, 1, 10, &tuning, "");
        let looped = InterventionDirective::new(InterventionKind::BreakLoop, 1, 3, &tuning, "");
        let active = ActiveRestrictions::compose([&stress, &burnout, &looped]);

        assert_eq!(active.combined.max_complexity, Some(0.3));
        assert_eq!(active.combined.max_urgency, Some(0.4));
        assert!((active.combined.risk_weight_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(active.combined.extra_diversity, 2);
        assert!((active.combined.planning_time_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(
            active.kinds,
            vec![
                InterventionKind::BreakLoop,
                InterventionKind::ReduceStimulation,
                InterventionKind::BurnoutRelief
            ]
        );
    }

    #[test]
    fn empty_composition_is_neutral() {
        let active = ActiveRestrictions::compose(std::iter::empty());
        assert_eq!(active, ActiveRestrictions::default());
        assert!(!active.contains(InterventionKind::DampenValidation));
    }
}
