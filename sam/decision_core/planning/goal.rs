use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mental_health::detectors::normalize_goal;

/// Coarse classification of a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    /// Seeks confirmation of earlier work.
    Validation,
    /// Question answering.
    Answer,
    /// Information retrieval.
    Retrieve,
    /// Content creation.
    Create,
    /// Analysis.
    Analyze,
    /// Planning.
    Plan,
    /// Anything else, usually a tool invocation.
    Tool,
}

impl GoalKind {
    /// Classifies a goal by keyword, checking classes in declaration order.
    #[must_use]
    pub fn classify(goal: &str) -> Self {
        const TABLE: &[(GoalKind, &[&str])] = &[
            (
                GoalKind::Validation,
                &["verify", "validate", "confirm", "check", "approve", "correct"],
            ),
            (GoalKind::Answer, &["answer", "what", "how", "why"]),
            (GoalKind::Retrieve, &["find", "search", "retrieve", "get"]),
            (GoalKind::Create, &["create", "generate", "make", "build"]),
            (
                GoalKind::Analyze,
                &["analyze", "examine", "study", "investigate"],
            ),
            (GoalKind::Plan, &["plan", "strategy", "approach"]),
        ];
        let normalized = normalize_goal(goal);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| tokens.contains(keyword)))
            .map_or(Self::Tool, |(kind, _)| *kind)
    }

    /// Whether the goal calls for deliberate decoding.
    #[must_use]
    pub const fn is_deliberative(self) -> bool {
        matches!(self, Self::Analyze | Self::Plan)
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Answer => "answer",
            Self::Retrieve => "retrieve",
            Self::Create => "create",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Tool => "tool",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(GoalKind::classify("What is the capital?"), GoalKind::Answer);
        assert_eq!(GoalKind::classify("find recent papers"), GoalKind::Retrieve);
        assert_eq!(GoalKind::classify("Build a dashboard"), GoalKind::Create);
        assert_eq!(GoalKind::classify("investigate the outage"), GoalKind::Analyze);
        assert_eq!(GoalKind::classify("plan the migration"), GoalKind::Plan);
        assert_eq!(GoalKind::classify("X"), GoalKind::Tool);
    }

    #[test]
    fn validation_wins_over_other_classes() {
        assert_eq!(GoalKind::classify("check what I wrote"), GoalKind::Validation);
        // Whole tokens only.
        assert_eq!(GoalKind::classify("whatever"), GoalKind::Tool);
    }
}
