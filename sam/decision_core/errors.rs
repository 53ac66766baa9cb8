//! Error types surfaced by the decision core.

use thiserror::Error;

use crate::orchestrator::machine::CyclePhase;

/// Errors returned across the orchestrator boundary.
///
/// Only malformed input aborts a cycle; every other failure degrades to the
/// fallback plan and is reported through the response flags.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// The request could not be accepted.
    #[error("invalid decision request: {0}")]
    Validation(String),
}

/// Internal faults that route a cycle to the fallback plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CycleFault {
    /// The cycle machine was asked for a transition outside its table.
    #[error("illegal cycle transition {from} -> {to}")]
    IllegalTransition {
        /// Phase the machine was in.
        from: CyclePhase,
        /// Phase that was requested.
        to: CyclePhase,
    },
    /// The plan generator returned an error.
    #[error("plan generation failed: {0}")]
    GenerationFailed(String),
    /// The plan generator panicked.
    #[error("plan generator panicked")]
    GeneratorPanicked,
    /// No usable candidate survived bound filtering.
    #[error("no candidate plan within bounds")]
    NoCandidates,
}
