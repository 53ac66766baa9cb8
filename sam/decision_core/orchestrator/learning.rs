use chrono::{DateTime, Utc};

use crate::{
    maturity::{MaturityStage, MaturityTracker, OutcomeClass, StageTransition},
    mental_health::{
        BehaviorSample, CycleOutcome, InterventionDirective, MentalHealthMetrics,
        MentalHealthMonitor, MentalHealthStatus,
    },
    models::AgentState,
};

/// Everything one completed cycle teaches the trackers.
#[derive(Debug, Clone)]
pub struct Lesson {
    pub sample: BehaviorSample,
    pub quality: f64,
}

/// What applying a lesson changed.
#[derive(Debug, Clone)]
pub struct LearningOutcome {
    pub experience_gained: u64,
    pub triggered: Vec<InterventionDirective>,
    pub regression: Option<StageTransition>,
    pub progression: Option<StageTransition>,
    pub stage: MaturityStage,
    pub status: MentalHealthStatus,
    pub metrics: MentalHealthMetrics,
}

impl LearningOutcome {
    pub fn transitions(&self) -> impl Iterator<Item = &StageTransition> {
        self.regression.iter().chain(self.progression.iter())
    }
}

/// Applies one lesson: experience, quality, behavior, regression, then progression.
pub fn apply(
    state: &mut AgentState,
    lesson: &Lesson,
    tracker: &MaturityTracker,
    monitor: &MentalHealthMonitor,
    now: DateTime<Utc>,
) -> LearningOutcome {
    let profile = &mut state.maturity;
    let mut experience_gained = match lesson.sample.outcome {
        CycleOutcome::Success => {
            let mut points = tracker.record_experience(profile, OutcomeClass::Success);
            if tracker.is_complex(lesson.sample.complexity) {
                points += tracker.record_experience(profile, OutcomeClass::Complex);
            }
            points
        }
        CycleOutcome::Failure => tracker.record_experience(profile, OutcomeClass::Failure),
    };
    tracker.record_quality(profile, lesson.quality);

    let triggered = monitor.observe(&mut state.mental_health, &lesson.sample);
    for _ in &triggered {
        experience_gained += tracker.record_experience(profile, OutcomeClass::Intervention);
    }

    let metrics = state.mental_health.metrics;
    let regression = tracker.check_regression(profile, &metrics, now);
    if regression.is_some() {
        experience_gained += tracker.record_experience(profile, OutcomeClass::Intervention);
    }
    let progression = if regression.is_none() {
        tracker.check_progression(profile, &metrics, now)
    } else {
        None
    };

    LearningOutcome {
        experience_gained,
        triggered,
        regression,
        progression,
        stage: profile.stage,
        status: monitor.status(&metrics),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{maturity::TransitionDirection, planning::GoalKind};
    use chrono::Duration;

    fn lesson(goal: &str, outcome: CycleOutcome, load: f64) -> Lesson {
        Lesson {
            sample: BehaviorSample {
                urgency: load,
                complexity: load,
                outcome,
                confidence: 0.6,
                elapsed_secs: 0.01,
                goal: goal.into(),
                goal_kind: GoalKind::Tool,
            },
            quality: 0.8,
        }
    }

    #[test]
    fn complex_success_earns_bonus() {
        let tracker = MaturityTracker::default();
        let monitor = MentalHealthMonitor::default();
        let mut state = AgentState::default();
        let outcome = apply(
            &mut state,
            &lesson("design schema", CycleOutcome::Success, 0.75),
            &tracker,
            &monitor,
            Utc::now(),
        );
        assert_eq!(outcome.experience_gained, 25);
        assert_eq!(state.maturity.experience_points, 25);
        assert_eq!(state.maturity.quality_history.len(), 1);
        assert_eq!(state.mental_health.cycle, 1);
    }

    #[test]
    fn failure_earns_failure_points_only() {
        let tracker = MaturityTracker::default();
        let monitor = MentalHealthMonitor::default();
        let mut state = AgentState::default();
        let outcome = apply(
            &mut state,
            &lesson("design schema", CycleOutcome::Failure, 0.75),
            &tracker,
            &monitor,
            Utc::now(),
        );
        assert_eq!(outcome.experience_gained, 5);
        assert!(outcome.transitions().next().is_none());
    }

    #[test]
    fn seasoned_child_progresses() {
        let tracker = MaturityTracker::default();
        let monitor = MentalHealthMonitor::default();
        let now = Utc::now();
        let mut state = AgentState::at_stage(MaturityStage::Child, now - Duration::days(30));
        state.maturity.experience_points = 5_000;
        state.maturity.quality_history = std::iter::repeat(0.8).take(10).collect();
        let outcome = apply(
            &mut state,
            &lesson("summarize notes", CycleOutcome::Success, 0.2),
            &tracker,
            &monitor,
            now,
        );
        let transition = outcome.progression.expect("progressed");
        assert_eq!(transition.direction, TransitionDirection::Progressed);
        assert_eq!(outcome.stage, MaturityStage::Adolescent);
        assert!(outcome.regression.is_none());
    }

    #[test]
    fn saturated_agent_regresses_once() {
        let tracker = MaturityTracker::default();
        let monitor = MentalHealthMonitor::default();
        let now = Utc::now();
        let mut state = AgentState::at_stage(MaturityStage::Adolescent, now);
        state.mental_health.metrics.stress = 1.0;
        state.mental_health.metrics.burnout_risk = 1.0;
        state.maturity.critical_streak = 4;
        let outcome = apply(
            &mut state,
            &lesson("urgent outage", CycleOutcome::Failure, 1.0),
            &tracker,
            &monitor,
            now,
        );
        let transition = outcome.regression.expect("regressed");
        assert_eq!(transition.to, MaturityStage::Child);
        assert!(outcome.progression.is_none());
        assert_eq!(state.maturity.critical_streak, 0);
    }
}
