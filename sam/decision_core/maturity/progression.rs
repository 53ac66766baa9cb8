use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MaturityProfile;
use crate::{config::MaturityConfig, mental_health::MentalHealthMetrics};

/// Condition currently preventing a stage advance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressionBlocker {
    /// Adult is the last stage.
    FinalStage,
    /// Not enough time spent in the current stage.
    DwellTime {
        /// Seconds still required.
        remaining_secs: u64,
    },
    /// Not enough experience.
    Experience {
        /// Experience held.
        have: u64,
        /// Experience required.
        need: u64,
    },
    /// Emotional stability under the floor.
    EmotionalStability {
        /// Current stability.
        value: f64,
        /// Required floor.
        floor: f64,
    },
    /// Burnout risk over the ceiling.
    Burnout {
        /// Current burnout risk.
        value: f64,
        /// Allowed ceiling.
        ceiling: f64,
    },
    /// Too few quality samples or a poor rolling average.
    DecisionQuality {
        /// Rolling average, if any samples exist.
        average: Option<f64>,
        /// Samples held.
        samples: usize,
        /// Required floor.
        floor: f64,
    },
}

/// Lists every unmet progression criterion.
///
/// An empty result means the profile may advance exactly one stage.
pub(crate) fn blockers(
    config: &MaturityConfig,
    profile: &MaturityProfile,
    metrics: &MentalHealthMetrics,
    now: DateTime<Utc>,
) -> Vec<ProgressionBlocker> {
    let stage = profile.stage;
    let (Some(dwell), Some(need)) = (
        config.min_dwell_secs.for_stage(stage),
        config.experience_to_advance.for_stage(stage),
    ) else {
        return vec![ProgressionBlocker::FinalStage];
    };

    let mut blocking = Vec::new();
    let elapsed = u64::try_from((now - profile.stage_entered_at).num_seconds()).unwrap_or(0);
    if elapsed < dwell {
        blocking.push(ProgressionBlocker::DwellTime {
            remaining_secs: dwell - elapsed,
        });
    }
    if profile.experience_points < need {
        blocking.push(ProgressionBlocker::Experience {
            have: profile.experience_points,
            need,
        });
    }
    if metrics.emotional_stability < config.stability_floor {
        blocking.push(ProgressionBlocker::EmotionalStability {
            value: metrics.emotional_stability,
            floor: config.stability_floor,
        });
    }
    if metrics.burnout_risk > config.burnout_ceiling {
        blocking.push(ProgressionBlocker::Burnout {
            value: metrics.burnout_risk,
            ceiling: config.burnout_ceiling,
        });
    }
    let samples = profile.quality_history.len();
    let average = profile.quality_average();
    let quality_ok = samples >= config.min_quality_samples
        && average.is_some_and(|avg| avg >= config.quality_floor);
    if !quality_ok {
        blocking.push(ProgressionBlocker::DecisionQuality {
            average,
            samples,
            floor: config.quality_floor,
        });
    }
    blocking
}
