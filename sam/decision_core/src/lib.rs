#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Adaptive decision core for SAM agents.
//!
//! A request enters the [`orchestrator::DecisionOrchestrator`], which reads the
//! agent's developmental stage and behavioral metrics, generates candidate
//! plans inside the stage bounds, scores them with personality- and
//! intervention-modulated utility weights, submits the winner to a policy
//! gate, and finally feeds the outcome back into both trackers.

#[path = "../collaborators/main.rs"]
pub mod collaborators;
#[path = "../config.rs"]
pub mod config;
#[path = "../errors.rs"]
pub mod errors;
#[path = "../maturity/main.rs"]
pub mod maturity;
#[path = "../mental_health/main.rs"]
pub mod mental_health;
#[path = "../models.rs"]
pub mod models;
#[path = "../orchestrator/main.rs"]
pub mod orchestrator;
#[path = "../planning/main.rs"]
pub mod planning;
#[path = "../runtime.rs"]
pub mod runtime;
#[path = "../telemetry.rs"]
pub mod telemetry;
#[path = "../utility/main.rs"]
pub mod utility;

pub use collaborators::{
    JsonlTraceSink, MemoryStateStore, MemoryTraceSink, PersonalitySource, PolicyChain, PolicyGate,
    PolicyVerdict, RiskCeilingGate, StateStore, StaticPersonality, TraceSink, VersionedState,
};
pub use config::EngineConfig;
pub use errors::{CycleFault, DecisionError};
pub use maturity::{MaturityProfile, MaturityStage, MaturityTracker, StageBounds};
pub use mental_health::{
    InterventionDirective, InterventionKind, MentalHealthMetrics, MentalHealthMonitor,
    MentalHealthStatus,
};
pub use models::{
    ActionPlan, AgentState, DecisionRequest, DecisionResponse, DecisionTrace,
    PersonalityInfluence, PlanStrategy,
};
pub use orchestrator::{
    machine::CyclePhase,
    performance::{EngineStatus, PerformanceSnapshot},
    DecisionOrchestrator,
};
pub use planning::{PlanGenerator, TemplatePlanGenerator};
pub use runtime::DecisionRuntime;
pub use telemetry::DecisionTelemetry;
pub use utility::UtilityEngine;
