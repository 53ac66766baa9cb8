//! Behavioral metrics, pattern detection, and intervention directives.
//!
//! [`MentalHealthMonitor::observe`] consumes one behavioral sample per
//! completed cycle. Directives it emits take effect from the next cycle and
//! expire on their own after the configured number of cycles.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::MentalHealthConfig, planning::goal::GoalKind};

/// Smoothing and pattern detection helpers.
pub mod detectors;
/// Intervention directives and restrictions.
pub mod directives;

pub use directives::{ActiveRestrictions, InterventionDirective, InterventionKind, Restriction};

/// Behavioral metrics, each kept within its documented range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MentalHealthMetrics {
    /// Stress level in `[0, 1]`.
    pub stress: f64,
    /// Excitement level in `[0, 1]`.
    pub excitement: f64,
    /// Similar goals in the recent window.
    pub recursive_loop_count: u32,
    /// Validation-seeking score in `[0, 1]`.
    pub addictive_behavior_score: f64,
    /// Emotional stability in `[0, 1]`.
    pub emotional_stability: f64,
    /// Burnout risk in `[0, 1]`.
    pub burnout_risk: f64,
}

impl MentalHealthMetrics {
    fn clamp(&mut self) {
        for value in [
            &mut self.stress,
            &mut self.excitement,
            &mut self.addictive_behavior_score,
            &mut self.emotional_stability,
            &mut self.burnout_risk,
        ] {
            *value = if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
    }
}

impl Default for MentalHealthMetrics {
    fn default() -> Self {
        Self {
            stress: 0.0,
            excitement: 0.0,
            recursive_loop_count: 0,
            addictive_behavior_score: 0.0,
            emotional_stability: 1.0,
            burnout_risk: 0.0,
        }
    }
}

/// Status derived from the metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MentalHealthStatus {
    /// Nothing noteworthy.
    #[default]
    Stable,
    /// Excitement is high.
    Excited,
    /// Stress is high.
    Stressed,
    /// The agent keeps pursuing the same goal.
    Recursive,
    /// The agent keeps seeking validation.
    Addictive,
    /// Burnout risk is high.
    Overwhelmed,
}

impl MentalHealthStatus {
    /// Operator recommendations for this status.
    #[must_use]
    pub fn recommendations(self) -> Vec<String> {
        let lines: &[&str] = match self {
            Self::Stable => &[],
            Self::Excited => &[
                "Double-check decisions before acting",
                "Slow down the decision pace",
            ],
            Self::Stressed => &[
                "Reduce task complexity",
                "Increase planning time",
                "Take breaks between tasks",
            ],
            Self::Recursive => &[
                "Try a different approach",
                "Break the problem into smaller parts",
                "Ask for supervision",
            ],
            Self::Addictive => &["Reduce validation seeking", "Trust established judgment"],
            Self::Overwhelmed => &[
                "Stop and reassess priorities",
                "Request supervision",
                "Defer non-urgent tasks",
            ],
        };
        lines.iter().map(|line| (*line).to_string()).collect()
    }
}

/// Per-agent monitor state persisted between cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MentalHealthState {
    /// Current metrics.
    pub metrics: MentalHealthMetrics,
    /// Completed cycles observed.
    pub cycle: u64,
    /// Normalized recent goals, oldest first.
    #[serde(default)]
    pub recent_goals: VecDeque<String>,
    /// Whether each recent goal was validation-seeking.
    #[serde(default)]
    pub recent_validation: VecDeque<bool>,
    /// Recent stress readings.
    #[serde(default)]
    pub recent_stress: VecDeque<f64>,
    /// Issued directives not yet pruned.
    #[serde(default)]
    pub directives: Vec<InterventionDirective>,
}

impl MentalHealthState {
    /// Index the next cycle will have.
    #[must_use]
    pub const fn next_cycle(&self) -> u64 {
        self.cycle.saturating_add(1)
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A generated plan was approved and handed off.
    Success,
    /// The cycle ended on the fallback.
    Failure,
}

/// Behavioral sample of one completed cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorSample {
    /// Effective urgency.
    pub urgency: f64,
    /// Effective complexity.
    pub complexity: f64,
    /// Outcome.
    pub outcome: CycleOutcome,
    /// Response confidence.
    pub confidence: f64,
    /// Cycle wall time in seconds.
    pub elapsed_secs: f64,
    /// Raw goal text.
    pub goal: String,
    /// Goal classification.
    pub goal_kind: GoalKind,
}

/// Applies the monitor rules to per-agent state.
#[derive(Debug, Clone, Default)]
pub struct MentalHealthMonitor {
    config: MentalHealthConfig,
}

impl MentalHealthMonitor {
    /// Creates a monitor with the given thresholds.
    #[must_use]
    pub const fn new(config: MentalHealthConfig) -> Self {
        Self { config }
    }

    /// Directives shaping the next cycle.
    #[must_use]
    pub fn active_directives<'a>(
        &self,
        state: &'a MentalHealthState,
    ) -> Vec<&'a InterventionDirective> {
        let cycle = state.next_cycle();
        state
            .directives
            .iter()
            .filter(|directive| directive.is_active_at(cycle))
            .collect()
    }

    /// Most-restrictive composition of the directives shaping the next cycle.
    #[must_use]
    pub fn restrictions(&self, state: &MentalHealthState) -> ActiveRestrictions {
        ActiveRestrictions::compose(self.active_directives(state))
    }

    /// Status derived from the metrics.
    #[must_use]
    pub fn status(&self, metrics: &MentalHealthMetrics) -> MentalHealthStatus {
        let config = &self.config;
        if metrics.burnout_risk >= config.burnout_threshold {
            MentalHealthStatus::Overwhelmed
        } else if metrics.stress >= config.stress_threshold {
            MentalHealthStatus::Stressed
        } else if metrics.excitement >= config.excitement_threshold {
            MentalHealthStatus::Excited
        } else if metrics.recursive_loop_count >= config.loop_threshold {
            MentalHealthStatus::Recursive
        } else if metrics.addictive_behavior_score >= config.addictive_threshold {
            MentalHealthStatus::Addictive
        } else {
            MentalHealthStatus::Stable
        }
    }

    /// Consumes one completed cycle and returns the directives it triggered.
    pub fn observe(
        &self,
        state: &mut MentalHealthState,
        sample: &BehaviorSample,
    ) -> Vec<InterventionDirective> {
        state.cycle = state.next_cycle();
        let cycle = state.cycle;
        state
            .directives
            .retain(|directive| directive.expires_after_cycle > cycle);

        self.update_affect(state, sample);
        let mut triggered = Vec::new();
        let tuning = &self.config.directives;

        let goal = detectors::normalize_goal(&sample.goal);
        let similar = detectors::count_similar(
            &state.recent_goals,
            &goal,
            self.config.similarity_threshold,
        );
        state.metrics.recursive_loop_count = similar;
        if similar >= self.config.loop_threshold {
            state.recent_goals.clear();
            triggered.push(InterventionDirective::new(
                InterventionKind::BreakLoop,
                cycle,
                tuning.break_loop_cycles,
                tuning,
                format!("{similar} similar goals within the recent window"),
            ));
        } else {
            detectors::push_bounded(&mut state.recent_goals, goal, self.config.loop_window);
        }

        let seeking = sample.goal_kind == GoalKind::Validation;
        detectors::push_bounded(
            &mut state.recent_validation,
            seeking,
            self.config.addictive_window,
        );
        let fraction = detectors::true_fraction(&state.recent_validation);
        let metrics = &mut state.metrics;
        if seeking
            && state.recent_validation.len() >= self.config.addictive_min_samples
            && fraction > self.config.validation_fraction
        {
            metrics.addictive_behavior_score += self.config.addictive_increment;
        } else {
            metrics.addictive_behavior_score *= 1.0 - self.config.addictive_decay;
        }
        metrics.clamp();

        let pending = |kind: InterventionKind| {
            state
                .directives
                .iter()
                .any(|directive| directive.kind == kind && directive.is_active_at(cycle + 1))
        };
        if metrics.addictive_behavior_score >= self.config.addictive_threshold
            && !pending(InterventionKind::DampenValidation)
        {
            triggered.push(InterventionDirective::new(
                InterventionKind::DampenValidation,
                cycle,
                tuning.validation_cycles,
                tuning,
                format!("validation-seeking share {fraction:.2}"),
            ));
        }
        if metrics.stress >= self.config.stress_threshold
            && !pending(InterventionKind::ReduceStimulation)
        {
            triggered.push(InterventionDirective::new(
                InterventionKind::ReduceStimulation,
                cycle,
                tuning.stimulation_cycles,
                tuning,
                format!("stress {:.2}", metrics.stress),
            ));
        }
        if metrics.burnout_risk >= self.config.burnout_threshold
            && !pending(InterventionKind::BurnoutRelief)
        {
            triggered.push(InterventionDirective::new(
                InterventionKind::BurnoutRelief,
                cycle,
                tuning.burnout_cycles,
                tuning,
                format!("burnout risk {:.2}", metrics.burnout_risk),
            ));
        }

        for directive in &triggered {
            state
                .directives
                .retain(|existing| existing.kind != directive.kind);
            state.directives.push(directive.clone());
        }
        if !triggered.is_empty() {
            debug!(cycle, count = triggered.len(), "mental health directives issued");
        }
        triggered
    }

    /// Clears metrics, windows, and directives.
    pub fn reset(&self, state: &mut MentalHealthState) {
        *state = MentalHealthState::default();
    }

    fn update_affect(&self, state: &mut MentalHealthState, sample: &BehaviorSample) {
        let config = &self.config;
        let urgency = sample.urgency.clamp(0.0, 1.0);
        let complexity = sample.complexity.clamp(0.0, 1.0);
        let load = urgency * complexity;
        let failed = sample.outcome == CycleOutcome::Failure;
        let metrics = &mut state.metrics;

        let target = match sample.outcome {
            CycleOutcome::Failure => (load * config.failure_load_multiplier).min(1.0),
            CycleOutcome::Success if complexity < config.low_effort_complexity => 0.0,
            CycleOutcome::Success => load,
        };
        metrics.stress = detectors::ewma(metrics.stress, target, config.alpha);
        if failed {
            metrics.stress += config.failure_stress;
        }
        metrics.clamp();

        if metrics.stress >= config.stress_high {
            metrics.burnout_risk = detectors::ewma(metrics.burnout_risk, 1.0, config.burnout_alpha);
        } else {
            metrics.burnout_risk *= 1.0 - config.burnout_decay;
        }
        if urgency > config.overload_level && complexity > config.overload_level {
            metrics.burnout_risk += config.overload_burnout;
        }

        metrics.excitement -= config.excitement_decay;
        if !failed && sample.confidence > config.confident_level {
            metrics.excitement += config.excitement_gain * sample.confidence;
        }

        if failed {
            metrics.emotional_stability -= config.stability_loss;
        } else {
            metrics.emotional_stability += config.stability_gain;
        }
        detectors::push_bounded(
            &mut state.recent_stress,
            metrics.stress,
            config.volatility_window,
        );
        if detectors::std_dev(&state.recent_stress) > config.volatility_threshold {
            metrics.emotional_stability -= config.volatility_penalty;
        }
        metrics.clamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(goal: &str, kind: GoalKind, outcome: CycleOutcome, load: f64) -> BehaviorSample {
        BehaviorSample {
            urgency: load,
            complexity: load,
            outcome,
            confidence: 0.5,
            elapsed_secs: 0.01,
            goal: goal.into(),
            goal_kind: kind,
        }
    }

    #[test]
    fn repeated_goal_triggers_exactly_once() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        let mut fired = Vec::new();
        for index in 1..=6 {
            let triggered = monitor.observe(
                &mut state,
                &sample("summarize the report", GoalKind::Tool, CycleOutcome::Success, 0.2),
            );
            if !triggered.is_empty() {
                fired.push((index, triggered));
            }
        }
        assert_eq!(fired.len(), 1);
        let (cycle, directives) = &fired[0];
        assert_eq!(*cycle, 6);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].kind, InterventionKind::BreakLoop);
        assert!(state.recent_goals.is_empty());

        let restrictions = monitor.restrictions(&state);
        assert!(restrictions.contains(InterventionKind::BreakLoop));
        assert_eq!(restrictions.combined.extra_diversity, 2);
    }

    #[test]
    fn punctuation_goals_do_not_form_a_loop() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        for goal in ["???", "!!", "...", "?!", "--", "**", "##", "??"] {
            let triggered = monitor.observe(
                &mut state,
                &sample(goal, GoalKind::Tool, CycleOutcome::Success, 0.2),
            );
            assert!(triggered.is_empty(), "{goal} triggered a directive");
        }
        assert_eq!(state.metrics.recursive_loop_count, 0);
    }

    #[test]
    fn directives_expire_after_their_duration() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        for _ in 0..6 {
            let _ = monitor.observe(
                &mut state,
                &sample("same goal", GoalKind::Tool, CycleOutcome::Success, 0.2),
            );
        }
        let goals = ["alpha task", "beta job", "gamma work", "delta chore"];
        for (step, goal) in goals.iter().enumerate() {
            let active = monitor.restrictions(&state).contains(InterventionKind::BreakLoop);
            assert_eq!(active, step < 3, "cycle offset {step}");
            let _ = monitor.observe(&mut state, &sample(goal, GoalKind::Tool, CycleOutcome::Success, 0.2));
        }
        assert!(state.directives.is_empty());
    }

    #[test]
    fn sustained_failures_raise_stress_and_burnout() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        let mut kinds = Vec::new();
        for index in 0..40 {
            let goal = format!("urgent incident {index}");
            for directive in monitor.observe(
                &mut state,
                &sample(&goal, GoalKind::Tool, CycleOutcome::Failure, 0.95),
            ) {
                kinds.push(directive.kind);
            }
            let metrics = state.metrics;
            for value in [metrics.stress, metrics.burnout_risk, metrics.emotional_stability] {
                assert!((0.0..=1.0).contains(&value));
            }
        }
        assert!((state.metrics.stress - 1.0).abs() < f64::EPSILON);
        assert!(state.metrics.burnout_risk >= 0.8);
        assert!(kinds.contains(&InterventionKind::ReduceStimulation));
        assert!(kinds.contains(&InterventionKind::BurnoutRelief));
        assert_eq!(monitor.status(&state.metrics), MentalHealthStatus::Overwhelmed);
        assert!(!MentalHealthStatus::Overwhelmed.recommendations().is_empty());

        let restrictions = monitor.restrictions(&state);
        assert_eq!(restrictions.combined.max_complexity, Some(0.3));
    }

    #[test]
    fn overload_level_is_configurable() {
        let overloaded = sample("ship hotfix", GoalKind::Tool, CycleOutcome::Success, 0.85);

        let stock = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        let _ = stock.observe(&mut state, &overloaded);
        assert!((state.metrics.burnout_risk - 0.05).abs() < 1e-9);

        let relaxed = MentalHealthMonitor::new(MentalHealthConfig {
            overload_level: 0.9,
            ..MentalHealthConfig::default()
        });
        let mut state = MentalHealthState::default();
        let _ = relaxed.observe(&mut state, &overloaded);
        assert!(state.metrics.burnout_risk.abs() < f64::EPSILON);
    }

    #[test]
    fn low_effort_success_relaxes_stress() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        state.metrics.stress = 0.6;
        let _ = monitor.observe(
            &mut state,
            &sample("tidy notes", GoalKind::Tool, CycleOutcome::Success, 0.1),
        );
        assert!(state.metrics.stress < 0.6);
        assert!(state.metrics.emotional_stability <= 1.0);
    }

    #[test]
    fn validation_seeking_is_dampened() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        let mut dampened_at = None;
        for index in 0..30_u32 {
            let goal = format!("verify draft number {index}");
            let triggered = monitor.observe(
                &mut state,
                &sample(&goal, GoalKind::Validation, CycleOutcome::Success, 0.2),
            );
            if triggered
                .iter()
                .any(|directive| directive.kind == InterventionKind::DampenValidation)
            {
                dampened_at.get_or_insert(index);
            }
        }
        assert!(dampened_at.is_some());
        assert!(state.metrics.addictive_behavior_score >= 0.6);
        let restrictions = monitor.restrictions(&state);
        assert!(restrictions.combined.validation_goal_factor < 1.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let monitor = MentalHealthMonitor::default();
        let mut state = MentalHealthState::default();
        let _ = monitor.observe(&mut state, &sample("x", GoalKind::Tool, CycleOutcome::Failure, 0.9));
        monitor.reset(&mut state);
        assert_eq!(state, MentalHealthState::default());
        assert_eq!(monitor.status(&state.metrics), MentalHealthStatus::Stable);
    }
}
