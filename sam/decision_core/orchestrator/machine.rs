use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::errors::CycleFault;

/// Phases of a decision cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Waiting for a request.
    Idle,
    /// Reading state and resolving bounds.
    Sensing,
    /// Classifying the goal and computing the stability signal.
    Evaluating,
    /// Generating candidates.
    Planning,
    /// Scoring candidates.
    Scoring,
    /// Consulting the policy gate.
    PolicyCheck,
    /// Final budget and time accounting.
    Selecting,
    /// Handing the plan off.
    Acting,
    /// Updating the trackers.
    Learning,
    /// Replacing the selection with the fallback plan.
    Fallback,
    /// Request rejected before any mutation.
    Aborted,
}

impl CyclePhase {
    /// Whether `next` may directly follow this phase.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use CyclePhase::{
            Aborted, Acting, Evaluating, Fallback, Idle, Learning, Planning, PolicyCheck, Scoring,
            Selecting, Sensing,
        };
        matches!(
            (self, next),
            (Idle, Sensing | Aborted)
                | (Sensing, Evaluating | Fallback)
                | (Evaluating, Planning | Fallback)
                | (Planning, Scoring | Fallback)
                | (Scoring, PolicyCheck | Fallback)
                | (PolicyCheck, Selecting | Fallback)
                | (Selecting, Acting | Fallback)
                | (Fallback, Acting)
                | (Acting, Learning)
                | (Learning, Idle)
        )
    }

    /// Whether the fallback may still be entered from this phase.
    #[must_use]
    pub const fn can_fall_back(self) -> bool {
        self.can_transition_to(Self::Fallback)
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Sensing => "sensing",
            Self::Evaluating => "evaluating",
            Self::Planning => "planning",
            Self::Scoring => "scoring",
            Self::PolicyCheck => "policy_check",
            Self::Selecting => "selecting",
            Self::Acting => "acting",
            Self::Learning => "learning",
            Self::Fallback => "fallback",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Enforces the transition table and tracks the cycle deadline.
#[derive(Debug, Clone)]
pub struct CycleMachine {
    phase: CyclePhase,
    history: Vec<CyclePhase>,
    started: Instant,
    limit: Option<Duration>,
    expired_at: Option<CyclePhase>,
}

impl CycleMachine {
    /// Starts an idle machine with an optional wall-clock limit.
    #[must_use]
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            phase: CyclePhase::Idle,
            history: vec![CyclePhase::Idle],
            started: Instant::now(),
            limit,
            expired_at: None,
        }
    }

    /// Moves to `next` if the table allows it, then checks the deadline.
    pub fn advance(&mut self, next: CyclePhase) -> Result<(), CycleFault> {
        if !self.phase.can_transition_to(next) {
            return Err(CycleFault::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        let _ = self.check_deadline();
        Ok(())
    }

    /// Enters the fallback from any phase that allows it.
    ///
    /// Returns `false` when the machine is already falling back or past the
    /// point where the fallback can replace the selection.
    pub fn fall_back(&mut self) -> bool {
        if self.phase.can_fall_back() {
            self.phase = CyclePhase::Fallback;
            self.history.push(CyclePhase::Fallback);
            let _ = self.check_deadline();
            true
        } else {
            false
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Phases visited so far, starting with idle.
    #[must_use]
    pub fn history(&self) -> &[CyclePhase] {
        &self.history
    }

    /// Time since the machine was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the limit, `None` without a limit.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    /// Phase during which the limit was first seen exceeded.
    #[must_use]
    pub const fn expired_at(&self) -> Option<CyclePhase> {
        self.expired_at
    }

    /// Re-checks the limit against the current phase and returns the expiry phase.
    pub fn check_deadline(&mut self) -> Option<CyclePhase> {
        if self.expired_at.is_none() {
            if let Some(limit) = self.limit {
                if self.started.elapsed() > limit {
                    self.expired_at = Some(self.phase);
                }
            }
        }
        self.expired_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let mut machine = CycleMachine::new(None);
        for phase in [
            CyclePhase::Sensing,
            CyclePhase::Evaluating,
            CyclePhase::Planning,
            CyclePhase::Scoring,
            CyclePhase::PolicyCheck,
            CyclePhase::Selecting,
            CyclePhase::Acting,
            CyclePhase::Learning,
            CyclePhase::Idle,
        ] {
            machine.advance(phase).unwrap();
        }
        assert_eq!(machine.history().len(), 10);
        assert!(machine.expired_at().is_none());
        assert!(machine.remaining().is_none());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut machine = CycleMachine::new(None);
        let err = machine.advance(CyclePhase::Scoring).unwrap_err();
        assert_eq!(
            err,
            CycleFault::IllegalTransition {
                from: CyclePhase::Idle,
                to: CyclePhase::Scoring
            }
        );
        assert_eq!(machine.phase(), CyclePhase::Idle);
        assert!(!machine.fall_back());
    }

    #[test]
    fn fallback_rejoins_at_acting() {
        let mut machine = CycleMachine::new(None);
        machine.advance(CyclePhase::Sensing).unwrap();
        machine.advance(CyclePhase::Evaluating).unwrap();
        machine.advance(CyclePhase::Planning).unwrap();
        machine.advance(CyclePhase::Scoring).unwrap();
        assert!(machine.fall_back());
        assert!(!machine.fall_back());
        machine.advance(CyclePhase::Acting).unwrap();
        assert!(machine.advance(CyclePhase::PolicyCheck).is_err());
    }

    #[test]
    fn zero_limit_expires_on_first_transition() {
        let mut machine = CycleMachine::new(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(1));
        machine.advance(CyclePhase::Sensing).unwrap();
        assert_eq!(machine.expired_at(), Some(CyclePhase::Sensing));
        assert_eq!(machine.remaining(), Some(Duration::ZERO));
    }
}
