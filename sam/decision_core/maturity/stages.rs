use std::fmt;

use serde::{Deserialize, Serialize};

/// Developmental stage of an agent.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum MaturityStage {
    /// Heavily supervised, lowest risk tolerance.
    #[default]
    Infant,
    /// Basic autonomy.
    Child,
    /// Most tasks without supervision.
    Adolescent,
    /// Full autonomy.
    Adult,
}

impl MaturityStage {
    /// Every stage in progression order.
    pub const ALL: [Self; 4] = [Self::Infant, Self::Child, Self::Adolescent, Self::Adult];

    /// Stage reached by advancing once.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Infant => Some(Self::Child),
            Self::Child => Some(Self::Adolescent),
            Self::Adolescent => Some(Self::Adult),
            Self::Adult => None,
        }
    }

    /// Stage reached by regressing once.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Infant => None,
            Self::Child => Some(Self::Infant),
            Self::Adolescent => Some(Self::Child),
            Self::Adult => Some(Self::Adolescent),
        }
    }

    /// Constraint bounds granted at this stage.
    #[must_use]
    pub const fn bounds(self) -> StageBounds {
        match self {
            Self::Infant => StageBounds {
                confidence_threshold: 0.9,
                supervision_level: 0.95,
                risk_tolerance: 0.1,
                max_complexity: 0.3,
                max_urgency: 0.5,
            },
            Self::Child => StageBounds {
                confidence_threshold: 0.8,
                supervision_level: 0.7,
                risk_tolerance: 0.3,
                max_complexity: 0.6,
                max_urgency: 0.7,
            },
            Self::Adolescent => StageBounds {
                confidence_threshold: 0.7,
                supervision_level: 0.4,
                risk_tolerance: 0.5,
                max_complexity: 0.8,
                max_urgency: 0.8,
            },
            Self::Adult => StageBounds {
                confidence_threshold: 0.6,
                supervision_level: 0.1,
                risk_tolerance: 0.7,
                max_complexity: 1.0,
                max_urgency: 1.0,
            },
        }
    }
}

impl fmt::Display for MaturityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infant => write!(f, "infant"),
            Self::Child => write!(f, "child"),
            Self::Adolescent => write!(f, "adolescent"),
            Self::Adult => write!(f, "adult"),
        }
    }
}

/// Limits a stage places on decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StageBounds {
    /// Confidence below which a decision is flagged for review.
    pub confidence_threshold: f64,
    /// Baseline supervision level.
    pub supervision_level: f64,
    /// Highest plan risk the stage tolerates.
    pub risk_tolerance: f64,
    /// Highest request complexity the stage accepts.
    pub max_complexity: f64,
    /// Highest request urgency the stage accepts.
    pub max_urgency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_loosen_with_each_stage() {
        for pair in MaturityStage::ALL.windows(2) {
            let (earlier, later) = (pair[0].bounds(), pair[1].bounds());
            assert!(later.risk_tolerance > earlier.risk_tolerance);
            assert!(later.max_complexity > earlier.max_complexity);
            assert!(later.max_urgency >= earlier.max_urgency);
            assert!(later.supervision_level < earlier.supervision_level);
            assert!(later.confidence_threshold < earlier.confidence_threshold);
        }
    }

    #[test]
    fn next_and_previous_are_inverse() {
        for stage in MaturityStage::ALL {
            if let Some(next) = stage.next() {
                assert_eq!(next.previous(), Some(stage));
                assert!(next > stage);
            }
        }
        assert_eq!(MaturityStage::Infant.previous(), None);
        assert_eq!(MaturityStage::Adult.next(), None);
    }
}
