//! The sense-evaluate-plan-act cycle.
//!
//! [`DecisionOrchestrator::decide`] drives a [`machine::CycleMachine`] through
//! sensing, evaluation, planning, scoring, the policy gate, and selection.
//! Any fault, denial, or exhausted budget along the way reroutes the cycle to
//! the fallback plan; only a malformed request returns an error. Learning runs
//! under a per-agent lock so concurrent cycles for one agent never lose
//! updates.

use std::{collections::BTreeSet, fmt, sync::Arc, time::Instant};

use anyhow::{anyhow, Result};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::json;
use shared_event_bus::EventTopic;
use shared_logging::LogLevel;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Situation evaluation.
pub mod evaluate;
mod learning;
/// Cycle phase state machine.
pub mod machine;
/// Engine-wide counters and the operator status view.
pub mod performance;

use self::{
    learning::{LearningOutcome, Lesson},
    machine::{CycleMachine, CyclePhase},
    performance::{EngineStatus, PerformanceCounters, PerformanceSnapshot},
};
use crate::{
    collaborators::{
        MemoryStateStore, MemoryTraceSink, PersonalitySource, PolicyChain, PolicyGate, StateStore,
        TraceSink, VersionedState,
    },
    config::EngineConfig,
    errors::{CycleFault, DecisionError},
    maturity::{MaturityStage, MaturitySummary, MaturityTracker, StageBounds, TransitionDirection},
    mental_health::{
        ActiveRestrictions, BehaviorSample, CycleOutcome, InterventionKind, MentalHealthMetrics,
        MentalHealthMonitor,
    },
    models::{
        ActionPlan, AgentState, ClampDimension, ClampRecord, DecisionRequest, DecisionResponse,
        DecisionTrace, MentalHealthSnapshot, PersonalityInfluence, ScoredCandidate,
    },
    planning::{
        assemble_candidates, fallback_plan, GoalKind, PlanGenerator, PlanningContext,
        TemplatePlanGenerator,
    },
    telemetry::DecisionTelemetry,
    utility::UtilityEngine,
};

/// Why a cycle ended on the fallback plan.
#[derive(Debug, Clone, PartialEq)]
enum FallbackCause {
    Fault(CycleFault),
    FallbackRanked,
    PolicyDenied,
    PolicyTimeout,
    PolicyUnavailable,
    BudgetExceeded { cost: u64, budget: u64 },
    TimeExceeded(CyclePhase),
}

impl FallbackCause {
    const fn flag(&self) -> &'static str {
        match self {
            Self::Fault(CycleFault::IllegalTransition { .. }) => "internal_fault",
            Self::Fault(_) => "generation_failed",
            Self::FallbackRanked => "fallback_ranked",
            Self::PolicyDenied => "policy_denied",
            Self::PolicyTimeout => "policy_timeout",
            Self::PolicyUnavailable => "policy_unavailable",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::TimeExceeded(_) => "time_exceeded",
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Fault(fault) => fault.to_string(),
            Self::FallbackRanked => "fallback plan ranked highest".into(),
            Self::PolicyDenied => "policy gate denied the top candidate".into(),
            Self::PolicyTimeout => "policy gate did not answer in time".into(),
            Self::PolicyUnavailable => "policy gate unavailable".into(),
            Self::BudgetExceeded { cost, budget } => {
                format!("selected plan cost {cost} exceeds budget {budget}")
            }
            Self::TimeExceeded(phase) => format!("time limit exceeded during {phase}"),
        }
    }

    const fn exhausts_budget(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. } | Self::TimeExceeded(_))
    }
}

/// Mutable bookkeeping for one cycle.
#[derive(Debug, Default)]
struct CycleNotes {
    warnings: Vec<String>,
    flags: BTreeSet<String>,
    degraded: bool,
    cause: Option<FallbackCause>,
}

impl CycleNotes {
    fn degrade(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!(%warning, "decision cycle degraded");
        self.degraded = true;
        self.warnings.push(warning);
    }

    const fn on_main_path(&self) -> bool {
        self.cause.is_none()
    }

    /// Routes to the fallback; the first cause wins.
    fn fall_back(&mut self, machine: &mut CycleMachine, cause: FallbackCause) {
        if self.cause.is_some() {
            return;
        }
        let from = machine.phase();
        if !machine.fall_back() {
            warn!(phase = %from, cause = cause.flag(), "fallback requested outside the cycle");
            return;
        }
        debug!(phase = %from, cause = cause.flag(), "cycle routed to fallback");
        self.flags.insert(cause.flag().to_string());
        if cause.exhausts_budget() {
            self.flags.insert("budget_exceeded".to_string());
        }
        self.warnings.push(cause.describe());
        self.cause = Some(cause);
    }

    /// Moves along the main path, watching the deadline.
    fn advance(&mut self, machine: &mut CycleMachine, next: CyclePhase) {
        if !self.on_main_path() {
            return;
        }
        if let Err(fault) = machine.advance(next) {
            self.fall_back(machine, FallbackCause::Fault(fault));
            return;
        }
        self.watch_deadline(machine);
    }

    fn watch_deadline(&mut self, machine: &mut CycleMachine) {
        if self.on_main_path() {
            if let Some(phase) = machine.check_deadline() {
                self.fall_back(machine, FallbackCause::TimeExceeded(phase));
            }
        }
    }
}

/// Stage, bounds, and inputs resolved during sensing.
#[derive(Debug, Clone)]
struct Sensed {
    stage: MaturityStage,
    bounds: StageBounds,
    snapshot: MentalHealthSnapshot,
    restrictions: ActiveRestrictions,
    personality: PersonalityInfluence,
    urgency: f64,
    complexity: f64,
    clamps: Vec<ClampRecord>,
    risk_ceiling: f64,
    max_steps: usize,
    supervision: f64,
}

/// Registry of per-agent learning locks.
#[derive(Debug, Clone, Default)]
struct AgentLocks {
    inner: Arc<RwLock<IndexMap<String, Arc<Mutex<()>>>>>,
}

impl AgentLocks {
    fn lock_for(&self, agent: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.inner.read().get(agent) {
            return lock.clone();
        }
        self.inner
            .write()
            .entry(agent.to_string())
            .or_default()
            .clone()
    }
}

/// Runs decision cycles against the configured collaborators.
#[derive(Clone)]
pub struct DecisionOrchestrator {
    config: EngineConfig,
    maturity: MaturityTracker,
    monitor: MentalHealthMonitor,
    utility: UtilityEngine,
    generator: Arc<dyn PlanGenerator>,
    policy: Arc<dyn PolicyGate>,
    traces: Arc<dyn TraceSink>,
    store: Arc<dyn StateStore>,
    personality: Option<Arc<dyn PersonalitySource>>,
    telemetry: Option<DecisionTelemetry>,
    initial_stage: MaturityStage,
    locks: AgentLocks,
    performance: PerformanceCounters,
}

impl fmt::Debug for DecisionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionOrchestrator")
            .field("policy", &self.policy.name())
            .field("initial_stage", &self.initial_stage)
            .field("personality", &self.personality.is_some())
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl DecisionOrchestrator {
    /// Creates an orchestrator with in-memory collaborators and an empty policy chain.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            maturity: MaturityTracker::new(config.maturity.clone()),
            monitor: MentalHealthMonitor::new(config.mental_health.clone()),
            utility: UtilityEngine::new(config.utility.clone()),
            generator: Arc::new(TemplatePlanGenerator::new(&config.planning)),
            policy: Arc::new(PolicyChain::new()),
            traces: Arc::new(MemoryTraceSink::new()),
            store: Arc::new(MemoryStateStore::new()),
            personality: None,
            telemetry: None,
            initial_stage: MaturityStage::Infant,
            locks: AgentLocks::default(),
            performance: PerformanceCounters::default(),
            config,
        }
    }

    /// Replaces the plan generator.
    #[must_use]
    pub fn with_plan_generator(mut self, generator: Arc<dyn PlanGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Replaces the policy gate.
    #[must_use]
    pub fn with_policy_gate(mut self, policy: Arc<dyn PolicyGate>) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the trace sink.
    #[must_use]
    pub fn with_trace_sink(mut self, traces: Arc<dyn TraceSink>) -> Self {
        self.traces = traces;
        self
    }

    /// Replaces the state store.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Attaches a personality source.
    #[must_use]
    pub fn with_personality_source(mut self, source: Arc<dyn PersonalitySource>) -> Self {
        self.personality = Some(source);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: DecisionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Stage assigned to agents the store has never seen.
    #[must_use]
    pub const fn with_initial_stage(mut self, stage: MaturityStage) -> Self {
        self.initial_stage = stage;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Operator view of an agent's maturity, including unmet progression criteria.
    pub async fn maturity_summary(&self, agent: &str) -> Result<MaturitySummary> {
        let state = self.load_state(agent).await?.map_or_else(
            || AgentState::at_stage(self.initial_stage, Utc::now()),
            |found| found.state,
        );
        Ok(self
            .maturity
            .summary(&state.maturity, &state.mental_health.metrics, Utc::now()))
    }

    /// Current mental-health status and metrics for an agent.
    pub async fn mental_health(&self, agent: &str) -> Result<MentalHealthSnapshot> {
        let metrics = self
            .load_state(agent)
            .await?
            .map(|found| found.state.mental_health.metrics)
            .unwrap_or_default();
        Ok(MentalHealthSnapshot {
            status: self.monitor.status(&metrics),
            metrics,
        })
    }

    /// Engine-wide request counters.
    #[must_use]
    pub fn performance(&self) -> PerformanceSnapshot {
        self.performance.snapshot()
    }

    /// Combined maturity, mental-health, and performance view for an agent.
    pub async fn status(&self, agent: &str) -> Result<EngineStatus> {
        let maturity = self.maturity_summary(agent).await?;
        let mental_health = self.mental_health(agent).await?;
        let started_at = self.performance.started_at();
        let uptime = Utc::now().signed_duration_since(started_at);
        #[allow(clippy::cast_precision_loss)]
        let uptime_secs = uptime.num_milliseconds().max(0) as f64 / 1_000.0;
        Ok(EngineStatus {
            agent: agent.to_string(),
            started_at,
            uptime_secs,
            maturity,
            recommendations: mental_health.status.recommendations(),
            mental_health,
            performance: self.performance.snapshot(),
        })
    }

    /// Clears an agent's behavioral metrics, windows, and directives.
    ///
    /// Maturity is left untouched. The write goes through the same per-agent
    /// lock and compare-and-swap as learning, so it never races a cycle.
    pub async fn reset_mental_health(&self, agent: &str) -> Result<MentalHealthSnapshot> {
        let lock = self.locks.lock_for(agent);
        let _guard = lock.lock().await;
        let attempts = self.config.orchestrator.store_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let Some(found) = self.load_state(agent).await? else {
                return Ok(MentalHealthSnapshot {
                    status: self.monitor.status(&MentalHealthMetrics::default()),
                    metrics: MentalHealthMetrics::default(),
                });
            };
            let mut state = found.state;
            self.monitor.reset(&mut state.mental_health);
            let metrics = state.mental_health.metrics;
            let swapped = timeout(
                self.config.orchestrator.store_timeout(),
                self.store.compare_and_swap(agent, Some(found.version), state),
            )
            .await
            .map_err(|_| anyhow!("state write timed out"))??;
            if swapped {
                info!(agent, "mental health reset");
                if let Some(telemetry) = &self.telemetry {
                    if let Err(err) = telemetry.log(
                        LogLevel::Info,
                        agent,
                        "mental_health.reset",
                        json!({ "attempt": attempt }),
                    ) {
                        warn!(error = %err, "decision log write failed");
                    }
                }
                return Ok(MentalHealthSnapshot {
                    status: self.monitor.status(&metrics),
                    metrics,
                });
            }
            debug!(attempt, "agent state moved underneath reset");
        }
        Err(anyhow!("mental health reset for {agent} lost every compare-and-swap"))
    }

    /// Runs one full decision cycle.
    ///
    /// Returns an error only for malformed requests; every other failure
    /// ends on the fallback plan and is reported through the response flags.
    #[allow(clippy::too_many_lines)]
    #[instrument(skip(self, request), fields(agent = %request.agent_id))]
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        let received = Instant::now();
        let limit = match request.validate() {
            Ok(limit) => limit,
            Err(err) => {
                self.performance.record_rejection(received.elapsed());
                warn!(error = %err, phase = %CyclePhase::Aborted, "decision request rejected");
                return Err(err);
            }
        };
        let agent = request.agent_id.as_str();
        let mut machine = CycleMachine::new(limit);
        let mut notes = CycleNotes::default();

        notes.advance(&mut machine, CyclePhase::Sensing);
        let sensed = self.sense(&request, &mut notes).await;
        for clamp in &sensed.clamps {
            notes.warnings.push(format!(
                "{:?} {:.2} clamped to {:.2} for {} stage",
                clamp.dimension, clamp.requested, clamp.applied, sensed.stage
            ));
        }

        notes.advance(&mut machine, CyclePhase::Evaluating);
        let goal_kind = GoalKind::classify(&request.goal);
        let vsp = evaluate::stability_signal(
            &self.config.evaluation,
            sensed.urgency,
            sensed.complexity,
            &sensed.snapshot.metrics,
            sensed.snapshot.status,
        );
        let mode = evaluate::decoding_mode(
            &self.config.evaluation,
            sensed.urgency,
            sensed.complexity,
            vsp,
            goal_kind,
        );
        let weights = self.utility.weights(
            sensed.stage,
            &sensed.personality,
            &sensed.restrictions.combined,
            goal_kind,
        );
        let context = PlanningContext {
            goal: request.goal.clone(),
            goal_kind,
            stage: sensed.stage,
            urgency: sensed.urgency,
            complexity: sensed.complexity,
            risk_ceiling: sensed.risk_ceiling,
            max_steps: sensed.max_steps,
            diversity: sensed.restrictions.combined.extra_diversity,
            mode,
        };
        let fallback = fallback_plan(&context, &self.config.planning);

        notes.advance(&mut machine, CyclePhase::Planning);
        let candidates = if notes.on_main_path() {
            let set = assemble_candidates(self.generator.as_ref(), &context, &self.config.planning);
            if let Some(fault) = set.fault {
                notes.fall_back(&mut machine, FallbackCause::Fault(fault));
            }
            set.plans
        } else {
            vec![fallback.clone()]
        };

        notes.advance(&mut machine, CyclePhase::Scoring);
        let ranked = self
            .utility
            .rank(&candidates, &weights, &sensed.personality);
        let top = ranked
            .first()
            .filter(|top| top.plan_id != fallback.id)
            .and_then(|top| candidates.iter().find(|plan| plan.id == top.plan_id));
        if top.is_none() {
            notes.fall_back(&mut machine, FallbackCause::FallbackRanked);
        }

        notes.advance(&mut machine, CyclePhase::PolicyCheck);
        if let Some(plan) = top.filter(|_| notes.on_main_path()) {
            self.check_policy(plan, &mut machine, &mut notes).await;
        }

        notes.advance(&mut machine, CyclePhase::Selecting);
        if let (Some(plan), Some(budget)) = (top.filter(|_| notes.on_main_path()), request.budget) {
            if plan.estimated_cost > budget {
                let cause = FallbackCause::BudgetExceeded {
                    cost: plan.estimated_cost,
                    budget,
                };
                notes.fall_back(&mut machine, cause);
            }
        }
        notes.watch_deadline(&mut machine);

        let fallback_used = notes.cause.is_some();
        let winner = match top {
            Some(plan) if !fallback_used => plan.clone(),
            _ => fallback,
        };
        rejoin(&mut machine, CyclePhase::Acting);

        let winner_score = ranked.iter().find(|scored| scored.plan_id == winner.id);
        let mut confidence = winner_score.map_or(0.0, |scored| scored.utility.clamp(0.0, 1.0));
        if fallback_used {
            confidence *= self.config.orchestrator.fallback_confidence_factor;
        }
        if confidence < sensed.bounds.confidence_threshold {
            notes.warnings.push(format!(
                "confidence {confidence:.2} below {} threshold {:.2}; supervision {:.2} advised",
                sensed.stage, sensed.bounds.confidence_threshold, sensed.supervision
            ));
        }

        rejoin(&mut machine, CyclePhase::Learning);
        let lesson = Lesson {
            sample: BehaviorSample {
                urgency: sensed.urgency,
                complexity: sensed.complexity,
                outcome: if fallback_used {
                    CycleOutcome::Failure
                } else {
                    CycleOutcome::Success
                },
                confidence,
                elapsed_secs: machine.elapsed().as_secs_f64(),
                goal: request.goal.clone(),
                goal_kind,
            },
            quality: winner.estimated_quality,
        };
        let learned = self.learn(agent, &lesson, &mut notes).await;
        rejoin(&mut machine, CyclePhase::Idle);

        let mut flags = notes.flags.clone();
        if fallback_used {
            flags.insert("fallback_used".to_string());
        }
        let triggered: Vec<_> = learned
            .as_ref()
            .map(|outcome| outcome.triggered.iter().map(|directive| directive.kind).collect())
            .unwrap_or_default();
        for kind in &triggered {
            flags.insert(format!("intervention:{kind}"));
        }
        let budget_exceeded = notes
            .cause
            .as_ref()
            .is_some_and(FallbackCause::exhausts_budget);
        let time_exceeded = matches!(notes.cause, Some(FallbackCause::TimeExceeded(_)));

        let trace = DecisionTrace {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id: request.agent_id.clone(),
            vsp,
            mode,
            stage: sensed.stage,
            goal_kind,
            reasons: selection_reasons(notes.cause.as_ref(), winner_score, &ranked, &triggered),
            candidates: ranked.clone(),
            winner: winner.id,
            personality_weights: sensed.personality,
            utility_weights: weights,
            policy_flags: flags,
            clamps: sensed.clamps.clone(),
            supervision_level: sensed.supervision,
            active_interventions: sensed.restrictions.kinds.clone(),
            triggered_interventions: triggered,
            phases: machine.history().to_vec(),
            budget_exceeded,
            time_exceeded,
            fallback_used,
        };
        self.emit_trace(&trace, &mut notes).await;
        self.publish(agent, &trace, notes.cause.as_ref(), learned.as_ref())
            .await;

        let (stage, snapshot) = learned.as_ref().map_or(
            (sensed.stage, sensed.snapshot),
            |outcome| {
                (
                    outcome.stage,
                    MentalHealthSnapshot {
                        status: outcome.status,
                        metrics: outcome.metrics,
                    },
                )
            },
        );
        let mut recommendations = snapshot.status.recommendations();
        let planning_factor = sensed.restrictions.combined.planning_time_factor;
        if planning_factor > 1.0 {
            recommendations.push(format!("Allow {planning_factor:.1}x planning time"));
        }

        info!(
            plan = %winner.id,
            strategy = %winner.strategy,
            confidence,
            fallback_used,
            degraded = notes.degraded,
            "decision cycle completed"
        );
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.log(
                LogLevel::Info,
                agent,
                "decision.cycle.completed",
                json!({
                    "trace_id": trace.id,
                    "strategy": winner.strategy,
                    "confidence": confidence,
                    "fallback_used": fallback_used,
                    "degraded": notes.degraded,
                    "experience_gained": learned.as_ref().map(|outcome| outcome.experience_gained),
                }),
            ) {
                warn!(error = %err, "decision log write failed");
            }
        }

        self.performance.record_decision(
            confidence,
            fallback_used,
            notes.degraded,
            received.elapsed(),
        );
        Ok(DecisionResponse {
            plan_id: winner.id,
            plan: winner,
            confidence,
            trace_id: trace.id,
            stage,
            budget_exceeded,
            time_exceeded,
            fallback_used,
            degraded: notes.degraded,
            mental_health: snapshot,
            warnings: notes.warnings,
            recommendations,
        })
    }

    async fn sense(&self, request: &DecisionRequest, notes: &mut CycleNotes) -> Sensed {
        let agent = request.agent_id.as_str();
        let state = match self.load_state(agent).await {
            Ok(Some(found)) => found.state,
            Ok(None) => AgentState::at_stage(self.initial_stage, Utc::now()),
            Err(err) => {
                notes.degrade(format!("state store unavailable during sensing: {err:#}"));
                AgentState::at_stage(MaturityStage::Infant, Utc::now())
            }
        };
        let personality = match request.personality {
            Some(personality) => personality,
            None => self.resolve_personality(agent, notes).await,
        }
        .clamped();

        let restrictions = self.monitor.restrictions(&state.mental_health);
        let bounds = state.maturity.bounds();
        let combined = restrictions.combined;
        let max_urgency = combined
            .max_urgency
            .map_or(bounds.max_urgency, |cap| cap.min(bounds.max_urgency));
        let max_complexity = combined
            .max_complexity
            .map_or(bounds.max_complexity, |cap| cap.min(bounds.max_complexity));
        let mut clamps = Vec::new();
        let urgency = clamp_input(ClampDimension::Urgency, request.urgency, max_urgency, &mut clamps);
        let complexity = clamp_input(
            ClampDimension::Complexity,
            request.complexity,
            max_complexity,
            &mut clamps,
        );
        let risk_ceiling = request
            .constraints
            .max_risk
            .map_or(bounds.risk_tolerance, |cap| {
                cap.clamp(0.0, 1.0).min(bounds.risk_tolerance)
            });
        let max_steps = PlanningContext::step_cap(
            max_complexity,
            self.config.planning.steps_per_complexity,
            request.constraints.max_steps,
        );
        let metrics = state.mental_health.metrics;
        let status = self.monitor.status(&metrics);
        debug!(
            stage = %state.maturity.stage,
            urgency,
            complexity,
            directives = restrictions.kinds.len(),
            "sensed agent state"
        );

        Sensed {
            stage: state.maturity.stage,
            bounds,
            snapshot: MentalHealthSnapshot { status, metrics },
            personality,
            urgency,
            complexity,
            clamps,
            risk_ceiling,
            max_steps,
            supervision: (bounds.supervision_level + combined.supervision_boost).min(1.0),
            restrictions,
        }
    }

    async fn resolve_personality(&self, agent: &str, notes: &mut CycleNotes) -> PersonalityInfluence {
        let Some(source) = &self.personality else {
            return PersonalityInfluence::neutral();
        };
        match timeout(
            self.config.orchestrator.store_timeout(),
            source.personality_for(agent),
        )
        .await
        {
            Ok(Ok(found)) => found.unwrap_or_default(),
            Ok(Err(err)) => {
                notes.degrade(format!("personality source failed: {err:#}"));
                PersonalityInfluence::neutral()
            }
            Err(_) => {
                notes.degrade("personality source timed out");
                PersonalityInfluence::neutral()
            }
        }
    }

    async fn check_policy(&self, plan: &ActionPlan, machine: &mut CycleMachine, notes: &mut CycleNotes) {
        let configured = self.config.orchestrator.policy_timeout();
        let wait = machine
            .remaining()
            .map_or(configured, |left| left.min(configured));
        match timeout(wait, self.policy.check_plan(plan)).await {
            Ok(Ok(verdict)) => {
                notes.flags.extend(verdict.flags);
                if !verdict.approved {
                    notes.fall_back(machine, FallbackCause::PolicyDenied);
                }
            }
            Ok(Err(err)) => {
                notes.degrade(format!("policy gate {} failed: {err:#}", self.policy.name()));
                notes.fall_back(machine, FallbackCause::PolicyUnavailable);
            }
            Err(_) if machine.remaining().is_some_and(|left| left.is_zero()) => {
                notes.fall_back(machine, FallbackCause::TimeExceeded(CyclePhase::PolicyCheck));
            }
            Err(_) => {
                notes.degrade(format!("policy gate {} timed out", self.policy.name()));
                notes.fall_back(machine, FallbackCause::PolicyTimeout);
            }
        }
    }

    async fn learn(
        &self,
        agent: &str,
        lesson: &Lesson,
        notes: &mut CycleNotes,
    ) -> Option<LearningOutcome> {
        let lock = self.locks.lock_for(agent);
        let _guard = lock.lock().await;
        let attempts = self.config.orchestrator.store_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let (expected, mut state) = match self.load_state(agent).await {
                Ok(Some(found)) => (Some(found.version), found.state),
                Ok(None) => (None, AgentState::at_stage(self.initial_stage, Utc::now())),
                Err(err) => {
                    notes.degrade(format!("learning skipped, state store unavailable: {err:#}"));
                    return None;
                }
            };
            let outcome =
                learning::apply(&mut state, lesson, &self.maturity, &self.monitor, Utc::now());
            match timeout(
                self.config.orchestrator.store_timeout(),
                self.store.compare_and_swap(agent, expected, state),
            )
            .await
            {
                Ok(Ok(true)) => return Some(outcome),
                Ok(Ok(false)) => debug!(attempt, "agent state moved underneath learning"),
                Ok(Err(err)) => warn!(attempt, error = %format!("{err:#}"), "state write failed"),
                Err(_) => warn!(attempt, "state write timed out"),
            }
        }
        notes.degrade("learning update dropped after retry");
        None
    }

    async fn load_state(&self, agent: &str) -> Result<Option<VersionedState>> {
        let attempts = self.config.orchestrator.store_retries.saturating_add(1);
        let mut last = None;
        for _ in 0..attempts {
            match timeout(self.config.orchestrator.store_timeout(), self.store.load(agent)).await {
                Ok(Ok(found)) => return Ok(found),
                Ok(Err(err)) => last = Some(err),
                Err(_) => last = Some(anyhow!("state store read timed out")),
            }
        }
        Err(last.unwrap_or_else(|| anyhow!("state store unavailable")))
    }

    async fn emit_trace(&self, trace: &DecisionTrace, notes: &mut CycleNotes) {
        match timeout(
            self.config.orchestrator.trace_timeout(),
            self.traces.log_decision_trace(trace),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => notes.degrade(format!("trace {} not recorded: {err:#}", trace.id)),
            Err(_) => notes.degrade(format!("trace {} not recorded: sink timed out", trace.id)),
        }
    }

    async fn publish(
        &self,
        agent: &str,
        trace: &DecisionTrace,
        cause: Option<&FallbackCause>,
        learned: Option<&LearningOutcome>,
    ) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let mut events = Vec::new();
        if let Some(cause) = cause {
            events.push((
                EventTopic::Fallback,
                json!({
                    "trace_id": trace.id,
                    "plan_id": trace.winner,
                    "cause": cause.flag(),
                    "detail": cause.describe(),
                }),
            ));
        }
        if let Some(outcome) = learned {
            for directive in &outcome.triggered {
                events.push((
                    EventTopic::Intervention,
                    json!({
                        "kind": directive.kind,
                        "reason": directive.reason,
                        "expires_after_cycle": directive.expires_after_cycle,
                    }),
                ));
            }
            for transition in outcome.transitions() {
                let topic = match transition.direction {
                    TransitionDirection::Progressed => EventTopic::StageProgressed,
                    TransitionDirection::Regressed => EventTopic::StageRegressed,
                };
                events.push((
                    topic,
                    json!({ "from": transition.from, "to": transition.to, "at": transition.at }),
                ));
            }
        }
        for (topic, payload) in events {
            if let Err(err) = telemetry.event(agent, topic, payload).await {
                warn!(?topic, error = %format!("{err:#}"), "event publish failed");
            }
        }
    }

}

fn rejoin(machine: &mut CycleMachine, next: CyclePhase) {
    if let Err(fault) = machine.advance(next) {
        warn!(%fault, "cycle machine rejected transition");
    }
}

fn clamp_input(
    dimension: ClampDimension,
    requested: f64,
    cap: f64,
    clamps: &mut Vec<ClampRecord>,
) -> f64 {
    let applied = requested.clamp(0.0, cap.clamp(0.0, 1.0));
    if (applied - requested).abs() > f64::EPSILON {
        clamps.push(ClampRecord {
            dimension,
            requested,
            applied,
        });
    }
    applied
}

fn selection_reasons(
    cause: Option<&FallbackCause>,
    winner: Option<&ScoredCandidate>,
    ranked: &[ScoredCandidate],
    triggered: &[InterventionKind],
) -> Vec<String> {
    let mut reasons = Vec::new();
    match (cause, winner) {
        (Some(cause), _) => reasons.push(format!("fallback selected: {}", cause.describe())),
        (None, Some(winner)) => {
            reasons.push(format!(
                "highest utility {:.3} among {} candidates",
                winner.utility,
                ranked.len()
            ));
            if winner.factors.quality.value > 0.7 {
                reasons.push("high quality estimate".into());
            }
            if winner.factors.risk.value < 0.3 {
                reasons.push("low risk estimate".into());
            }
            reasons.push(winner.explanation.clone());
        }
        (None, None) => {}
    }
    for kind in triggered {
        reasons.push(format!("intervention triggered: {kind}"));
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::{PolicyVerdict, RiskCeilingGate, StaticPersonality},
        mental_health::{MentalHealthState, MentalHealthStatus},
        models::{PlanStrategy, RequestConstraints},
    };
    use async_trait::async_trait;
    use shared_event_bus::MemoryEventBus;
    use std::time::Duration;

    struct Harness {
        orchestrator: DecisionOrchestrator,
        traces: MemoryTraceSink,
        store: MemoryStateStore,
        bus: Arc<MemoryEventBus>,
    }

    fn harness() -> Harness {
        harness_with(EngineConfig::default())
    }

    fn harness_with(config: EngineConfig) -> Harness {
        let traces = MemoryTraceSink::new();
        let store = MemoryStateStore::new();
        let bus = Arc::new(MemoryEventBus::default());
        let telemetry = DecisionTelemetry::builder("sam.orchestrator.test")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let orchestrator = DecisionOrchestrator::new(config)
            .with_trace_sink(Arc::new(traces.clone()))
            .with_state_store(Arc::new(store.clone()))
            .with_telemetry(telemetry);
        Harness {
            orchestrator,
            traces,
            store,
            bus,
        }
    }

    struct DenyAll;

    #[async_trait]
    impl PolicyGate for DenyAll {
        fn name(&self) -> &str {
            "deny-all"
        }

        async fn check_plan(&self, _plan: &ActionPlan) -> Result<PolicyVerdict> {
            Ok(PolicyVerdict::deny("denied").with_flag("manual_review"))
        }
    }

    struct Stalled;

    #[async_trait]
    impl PolicyGate for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn check_plan(&self, _plan: &ActionPlan) -> Result<PolicyVerdict> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(PolicyVerdict::approve())
        }
    }

    struct Broken;

    #[async_trait]
    impl PolicyGate for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check_plan(&self, _plan: &ActionPlan) -> Result<PolicyVerdict> {
            Err(anyhow!("policy backend offline"))
        }
    }

    #[async_trait]
    impl TraceSink for Broken {
        async fn log_decision_trace(&self, _trace: &DecisionTrace) -> Result<()> {
            Err(anyhow!("trace backend offline"))
        }
    }

    #[async_trait]
    impl StateStore for Broken {
        async fn load(&self, _agent: &str) -> Result<Option<VersionedState>> {
            Err(anyhow!("store offline"))
        }

        async fn compare_and_swap(
            &self,
            _agent: &str,
            _expected: Option<u64>,
            _state: AgentState,
        ) -> Result<bool> {
            Err(anyhow!("store offline"))
        }
    }

    struct Panicking;

    impl PlanGenerator for Panicking {
        fn generate(&self, _context: &PlanningContext) -> Result<Vec<ActionPlan>> {
            panic!("generator bug")
        }
    }

    #[tokio::test]
    async fn routine_infant_goal_selects_a_generated_plan() {
        let h = harness();
        let response = h
            .orchestrator
            .decide(
                DecisionRequest::new("X")
                    .with_urgency(0.3)
                    .with_complexity(0.2),
            )
            .await
            .unwrap();

        assert!(!response.fallback_used);
        assert!(!response.budget_exceeded);
        assert!(!response.degraded);
        assert_ne!(response.plan.strategy, PlanStrategy::Fallback);

        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.clamps.is_empty());
        assert_eq!(trace.stage, MaturityStage::Infant);
        assert_eq!(trace.winner, response.plan_id);
        assert!(trace.winner_candidate().is_some());
        assert!(trace.candidates.iter().any(|c| c.strategy == PlanStrategy::Fallback));
        assert_eq!(
            trace.phases,
            vec![
                CyclePhase::Idle,
                CyclePhase::Sensing,
                CyclePhase::Evaluating,
                CyclePhase::Planning,
                CyclePhase::Scoring,
                CyclePhase::PolicyCheck,
                CyclePhase::Selecting,
                CyclePhase::Acting,
                CyclePhase::Learning,
                CyclePhase::Idle,
            ]
        );
        let weight_sum = trace.utility_weights.sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);

        let stored = h.store.snapshot("default").unwrap();
        assert_eq!(stored.maturity.experience_points, 10);
        assert_eq!(stored.mental_health.cycle, 1);
    }

    #[tokio::test]
    async fn inputs_above_stage_bounds_are_clamped() {
        let h = harness();
        let response = h
            .orchestrator
            .decide(
                DecisionRequest::new("analyze quarterly churn")
                    .with_urgency(0.95)
                    .with_complexity(0.9),
            )
            .await
            .unwrap();
        let trace = h.traces.get(response.trace_id).unwrap();
        assert_eq!(trace.clamps.len(), 2);
        let urgency = trace
            .clamps
            .iter()
            .find(|clamp| clamp.dimension == ClampDimension::Urgency)
            .unwrap();
        assert!((urgency.applied - 0.5).abs() < f64::EPSILON);
        assert!(response.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[tokio::test]
    async fn tiny_budget_forces_the_fallback() {
        let h = harness();
        let response = h
            .orchestrator
            .decide(
                DecisionRequest::new("X")
                    .with_urgency(0.3)
                    .with_complexity(0.2)
                    .with_budget(1),
            )
            .await
            .unwrap();

        assert!(response.fallback_used);
        assert!(response.budget_exceeded);
        assert!(!response.time_exceeded);
        assert!(response.plan.is_fallback());

        let trace = h.traces.get(response.trace_id).unwrap();
        assert_eq!(trace.winner, response.plan_id);
        assert!(trace.policy_flags.contains("budget_exceeded"));
        assert!(trace.policy_flags.contains("fallback_used"));
        assert!(trace.phases.contains(&CyclePhase::Fallback));
        assert_eq!(h.bus.by_topic(EventTopic::Fallback).len(), 1);
        assert!(response.confidence <= 0.5);
    }

    #[tokio::test]
    async fn exhausted_time_limit_sets_both_flags() {
        let h = harness();
        let response = h
            .orchestrator
            .decide(DecisionRequest::new("summarize inbox").with_time_limit(Duration::ZERO))
            .await
            .unwrap();
        assert!(response.fallback_used);
        assert!(response.time_exceeded);
        assert!(response.budget_exceeded);
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.policy_flags.contains("time_exceeded"));
        assert_eq!(trace.phases.last(), Some(&CyclePhase::Idle));
    }

    #[tokio::test]
    async fn recursive_goal_triggers_one_break_loop_and_diversifies() {
        let h = harness();
        let mut traces = Vec::new();
        for _ in 0..7 {
            let response = h
                .orchestrator
                .decide(DecisionRequest::new("X").with_urgency(0.3).with_complexity(0.2))
                .await
                .unwrap();
            traces.push(h.traces.get(response.trace_id).unwrap());
        }

        let fired: Vec<usize> = traces
            .iter()
            .enumerate()
            .filter(|(_, trace)| trace.triggered(InterventionKind::BreakLoop))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(fired, vec![5]);
        assert!(traces[5].policy_flags.contains("intervention:break_loop"));
        assert!(traces[6]
            .active_interventions
            .contains(&InterventionKind::BreakLoop));
        assert!(traces[6].candidates.len() > traces[5].candidates.len());
        assert!(traces[6].supervision_level > traces[5].supervision_level);
        assert_eq!(h.bus.by_topic(EventTopic::Intervention).len(), 1);
    }

    #[tokio::test]
    async fn policy_denial_falls_back_with_gate_flags() {
        let h = harness();
        let orchestrator = h.orchestrator.with_policy_gate(Arc::new(DenyAll));
        let response = orchestrator
            .decide(DecisionRequest::new("publish report"))
            .await
            .unwrap();
        assert!(response.fallback_used);
        assert!(!response.degraded);
        let trace = h.traces.get(response.trace_id).unwrap();
        for flag in ["policy_denied", "denied", "manual_review", "fallback_used"] {
            assert!(trace.policy_flags.contains(flag), "missing {flag}");
        }
    }

    #[tokio::test]
    async fn stalled_policy_gate_times_out() {
        let mut config = EngineConfig::default();
        config.orchestrator.policy_timeout_ms = 50;
        let h = harness_with(config);
        let orchestrator = h.orchestrator.with_policy_gate(Arc::new(Stalled));
        let response = orchestrator
            .decide(DecisionRequest::new("book travel"))
            .await
            .unwrap();
        assert!(response.fallback_used);
        assert!(response.degraded);
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.policy_flags.contains("policy_timeout"));
    }

    #[tokio::test]
    async fn failing_policy_gate_degrades() {
        let h = harness();
        let orchestrator = h.orchestrator.with_policy_gate(Arc::new(Broken));
        let response = orchestrator
            .decide(DecisionRequest::new("book travel"))
            .await
            .unwrap();
        assert!(response.fallback_used);
        assert!(response.degraded);
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.policy_flags.contains("policy_unavailable"));
    }

    #[tokio::test]
    async fn generator_panic_is_contained() {
        let h = harness();
        let orchestrator = h.orchestrator.with_plan_generator(Arc::new(Panicking));
        let response = orchestrator
            .decide(DecisionRequest::new("draft memo"))
            .await
            .unwrap();
        assert!(response.fallback_used);
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.policy_flags.contains("generation_failed"));
        assert_eq!(trace.candidates.len(), 1);
        assert!(!trace.phases.contains(&CyclePhase::PolicyCheck));
    }

    #[tokio::test]
    async fn broken_collaborators_still_produce_a_response() {
        let orchestrator = DecisionOrchestrator::new(EngineConfig::default())
            .with_state_store(Arc::new(Broken))
            .with_trace_sink(Arc::new(Broken));
        let response = orchestrator
            .decide(DecisionRequest::new("check calendar").for_agent("offline"))
            .await
            .unwrap();
        assert!(response.degraded);
        assert_eq!(response.stage, MaturityStage::Infant);
        assert!(response.warnings.iter().any(|w| w.contains("trace")));
        assert!(orchestrator.maturity_summary("offline").await.is_err());
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_without_side_effects() {
        let h = harness();
        let err = h
            .orchestrator
            .decide(DecisionRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Validation(_)));
        assert!(h.traces.is_empty());
        assert!(h.store.agents().is_empty());
    }

    #[tokio::test]
    async fn caller_risk_cap_and_personality_apply() {
        let h = harness();
        let bold = PersonalityInfluence {
            assertiveness: 0.9,
            ..PersonalityInfluence::neutral()
        };
        let orchestrator = h
            .orchestrator
            .with_initial_stage(MaturityStage::Adult)
            .with_personality_source(Arc::new(StaticPersonality::new().with_agent("ada", bold)))
            .with_policy_gate(Arc::new(RiskCeilingGate::new(0.2)));
        let response = orchestrator
            .decide(
                DecisionRequest::new("plan the migration")
                    .for_agent("ada")
                    .with_constraints(RequestConstraints {
                        max_risk: Some(0.2),
                        max_steps: Some(4),
                    }),
            )
            .await
            .unwrap();
        assert!(response.plan.estimated_risk <= 0.2);
        assert!(response.plan.steps.len() <= 4);
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!((trace.personality_weights.assertiveness - 0.9).abs() < f64::EPSILON);
        assert_eq!(trace.stage, MaturityStage::Adult);
    }

    #[tokio::test]
    async fn concurrent_cycles_for_one_agent_keep_every_update() {
        let h = harness();
        let orchestrator = Arc::new(h.orchestrator);
        let tasks: Vec<_> = (0..8)
            .map(|index| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .decide(DecisionRequest::new(format!("task number {index}")))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let state = h.store.snapshot("default").unwrap();
        assert_eq!(state.mental_health.cycle, 8);
        assert_eq!(h.traces.len(), 8);
    }

    #[tokio::test]
    async fn reset_clears_behavior_but_keeps_maturity() {
        let h = harness();
        for _ in 0..6 {
            h.orchestrator
                .decide(DecisionRequest::new("poll the queue").for_agent("looper"))
                .await
                .unwrap();
        }
        let before = h.store.snapshot("looper").unwrap();
        assert!(!before.mental_health.directives.is_empty());

        let snapshot = h.orchestrator.reset_mental_health("looper").await.unwrap();
        assert_eq!(snapshot.status, MentalHealthStatus::Stable);
        let after = h.store.snapshot("looper").unwrap();
        assert_eq!(after.mental_health, MentalHealthState::default());
        assert_eq!(after.maturity, before.maturity);

        let response = h
            .orchestrator
            .decide(DecisionRequest::new("poll the queue").for_agent("looper"))
            .await
            .unwrap();
        assert!(!response.plan_id.is_nil());
        let trace = h.traces.get(response.trace_id).unwrap();
        assert!(trace.active_interventions.is_empty());
    }

    #[tokio::test]
    async fn reset_of_unknown_agent_writes_nothing() {
        let h = harness();
        let snapshot = h.orchestrator.reset_mental_health("ghost").await.unwrap();
        assert_eq!(snapshot.metrics, MentalHealthMetrics::default());
        assert!(h.store.agents().is_empty());

        let offline = h.orchestrator.with_state_store(Arc::new(Broken));
        assert!(offline.reset_mental_health("ghost").await.is_err());
    }

    #[tokio::test]
    async fn performance_counts_every_request() {
        let h = harness();
        h.orchestrator
            .decide(DecisionRequest::new("X").with_urgency(0.3).with_complexity(0.2))
            .await
            .unwrap();
        h.orchestrator
            .decide(DecisionRequest::new("find the contract").with_budget(1))
            .await
            .unwrap();
        h.orchestrator.decide(DecisionRequest::new("")).await.unwrap_err();

        let performance = h.orchestrator.performance();
        assert_eq!(performance.total_requests, 3);
        assert_eq!(performance.successful_decisions, 2);
        assert_eq!(performance.failed_decisions, 1);
        assert_eq!(performance.fallback_decisions, 1);
        assert!((0.0..=1.0).contains(&performance.average_confidence));
        assert!(performance.average_response_ms >= 0.0);

        let status = h.orchestrator.status("default").await.unwrap();
        assert_eq!(status.performance, performance);
        assert_eq!(status.maturity.stage, MaturityStage::Infant);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failing_decision_log_does_not_fail_the_cycle() {
        let telemetry = DecisionTelemetry::builder("sam.orchestrator.test")
            .log_path("/dev/full")
            .build()
            .unwrap();
        assert!(telemetry
            .log(LogLevel::Info, "default", "warmup", json!({}))
            .is_err());
        let orchestrator =
            DecisionOrchestrator::new(EngineConfig::default()).with_telemetry(telemetry);
        let response = orchestrator
            .decide(DecisionRequest::new("tidy notes"))
            .await
            .unwrap();
        assert!(!response.trace_id.is_nil());
        assert_eq!(orchestrator.performance().successful_decisions, 1);
    }

    #[tokio::test]
    async fn summaries_reflect_learning() {
        let h = harness();
        h.orchestrator
            .decide(DecisionRequest::new("X").with_urgency(0.3).with_complexity(0.2))
            .await
            .unwrap();
        let summary = h.orchestrator.maturity_summary("default").await.unwrap();
        assert_eq!(summary.stage, MaturityStage::Infant);
        assert_eq!(summary.experience_points, 10);
        assert!(!summary.blockers.is_empty());
        let health = h.orchestrator.mental_health("default").await.unwrap();
        assert!(health.metrics.emotional_stability > 0.9);
    }
}
