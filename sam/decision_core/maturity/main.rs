//! Developmental stage tracking.
//!
//! The tracker is stateless: it applies experience, quality, progression, and
//! regression rules to a [`MaturityProfile`] owned by the caller, so the
//! orchestrator can run it inside its per-agent critical section.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{config::MaturityConfig, mental_health::MentalHealthMetrics};

/// Progression gates.
pub mod progression;
/// Stage definitions and bounds.
pub mod stages;

pub use progression::ProgressionBlocker;
pub use stages::{MaturityStage, StageBounds};

/// Persistent developmental record of one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaturityProfile {
    /// Current stage.
    pub stage: MaturityStage,
    /// Cumulative experience.
    pub experience_points: u64,
    /// When the current stage was entered.
    pub stage_entered_at: DateTime<Utc>,
    /// Rolling decision-quality samples, oldest first.
    #[serde(default)]
    pub quality_history: VecDeque<f64>,
    /// Consecutive cycles with critical stress and burnout.
    #[serde(default)]
    pub critical_streak: u32,
}

impl MaturityProfile {
    /// Fresh profile entering `stage` at `now`.
    #[must_use]
    pub const fn new(stage: MaturityStage, now: DateTime<Utc>) -> Self {
        Self {
            stage,
            experience_points: 0,
            stage_entered_at: now,
            quality_history: VecDeque::new(),
            critical_streak: 0,
        }
    }

    /// Bounds of the current stage.
    #[must_use]
    pub const fn bounds(&self) -> StageBounds {
        self.stage.bounds()
    }

    /// Mean of the retained quality samples.
    #[must_use]
    pub fn quality_average(&self) -> Option<f64> {
        if self.quality_history.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.quality_history.len() as f64;
        Some(self.quality_history.iter().sum::<f64>() / count)
    }

    fn enter(&mut self, stage: MaturityStage, now: DateTime<Utc>) {
        self.stage = stage;
        self.stage_entered_at = now;
        self.critical_streak = 0;
    }
}

impl Default for MaturityProfile {
    fn default() -> Self {
        Self::new(MaturityStage::Infant, Utc::now())
    }
}

/// Outcome classes that award experience.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// Plan approved and handed off.
    Success,
    /// Cycle ended on the fallback.
    Failure,
    /// Bonus for a successful high-complexity cycle.
    Complex,
    /// An intervention or regression fired.
    Intervention,
}

/// Direction of a stage change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    /// One stage forward.
    Progressed,
    /// One stage back.
    Regressed,
}

/// Stage change applied to a profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTransition {
    /// Stage left.
    pub from: MaturityStage,
    /// Stage entered.
    pub to: MaturityStage,
    /// Direction.
    pub direction: TransitionDirection,
    /// When the change was applied.
    pub at: DateTime<Utc>,
}

/// Read-only view for operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaturitySummary {
    /// Current stage.
    pub stage: MaturityStage,
    /// Cumulative experience.
    pub experience_points: u64,
    /// Bounds of the current stage.
    pub bounds: StageBounds,
    /// Rolling decision-quality average.
    pub quality_average: Option<f64>,
    /// Experience required to leave the stage.
    pub next_stage_experience: Option<u64>,
    /// Criteria still blocking progression.
    pub blockers: Vec<ProgressionBlocker>,
}

/// Applies maturity rules to agent profiles.
#[derive(Debug, Clone, Default)]
pub struct MaturityTracker {
    config: MaturityConfig,
}

impl MaturityTracker {
    /// Creates a tracker with the given thresholds.
    #[must_use]
    pub const fn new(config: MaturityConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &MaturityConfig {
        &self.config
    }

    /// Awards experience for an outcome and returns the amount added.
    pub fn record_experience(&self, profile: &mut MaturityProfile, outcome: OutcomeClass) -> u64 {
        let awards = &self.config.experience;
        let points = match outcome {
            OutcomeClass::Success => awards.success,
            OutcomeClass::Failure => awards.failure,
            OutcomeClass::Complex => awards.complex_bonus,
            OutcomeClass::Intervention => awards.intervention,
        };
        profile.experience_points = profile.experience_points.saturating_add(points);
        points
    }

    /// Pushes a decision-quality sample into the rolling window.
    pub fn record_quality(&self, profile: &mut MaturityProfile, quality: f64) {
        if !quality.is_finite() {
            return;
        }
        profile.quality_history.push_back(quality.clamp(0.0, 1.0));
        while profile.quality_history.len() > self.config.quality_window {
            profile.quality_history.pop_front();
        }
    }

    /// Whether an effective complexity earns the complex bonus.
    #[must_use]
    pub fn is_complex(&self, complexity: f64) -> bool {
        complexity >= self.config.complex_threshold
    }

    /// Unmet progression criteria for the profile.
    #[must_use]
    pub fn progression_blockers(
        &self,
        profile: &MaturityProfile,
        metrics: &MentalHealthMetrics,
        now: DateTime<Utc>,
    ) -> Vec<ProgressionBlocker> {
        progression::blockers(&self.config, profile, metrics, now)
    }

    /// Advances exactly one stage when every criterion holds.
    pub fn check_progression(
        &self,
        profile: &mut MaturityProfile,
        metrics: &MentalHealthMetrics,
        now: DateTime<Utc>,
    ) -> Option<StageTransition> {
        if !self.progression_blockers(profile, metrics, now).is_empty() {
            return None;
        }
        let from = profile.stage;
        let to = from.next()?;
        profile.enter(to, now);
        Some(StageTransition {
            from,
            to,
            direction: TransitionDirection::Progressed,
            at: now,
        })
    }

    /// Counts one cycle toward the critical streak and demotes when it completes.
    ///
    /// Must run exactly once per completed cycle. An infant at the end of a
    /// streak stays infant with the streak reset.
    pub fn check_regression(
        &self,
        profile: &mut MaturityProfile,
        metrics: &MentalHealthMetrics,
        now: DateTime<Utc>,
    ) -> Option<StageTransition> {
        let critical = self.config.critical_level;
        if metrics.stress >= critical && metrics.burnout_risk >= critical {
            profile.critical_streak = profile.critical_streak.saturating_add(1);
        } else {
            profile.critical_streak = 0;
            return None;
        }
        if profile.critical_streak < self.config.regression_cycles {
            return None;
        }
        let from = profile.stage;
        let Some(to) = from.previous() else {
            profile.critical_streak = 0;
            return None;
        };
        profile.enter(to, now);
        Some(StageTransition {
            from,
            to,
            direction: TransitionDirection::Regressed,
            at: now,
        })
    }

    /// Operator view of a profile.
    #[must_use]
    pub fn summary(
        &self,
        profile: &MaturityProfile,
        metrics: &MentalHealthMetrics,
        now: DateTime<Utc>,
    ) -> MaturitySummary {
        MaturitySummary {
            stage: profile.stage,
            experience_points: profile.experience_points,
            bounds: profile.bounds(),
            quality_average: profile.quality_average(),
            next_stage_experience: self.config.experience_to_advance.for_stage(profile.stage),
            blockers: self.progression_blockers(profile, metrics, now),
        }
    }
}
