//! Runtime entrypoints and sample execution helpers.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use shared_event_bus::{EventRecord, MemoryEventBus};
use tokio::time::sleep;

use crate::{
    collaborators::{JsonlTraceSink, MemoryStateStore, MemoryTraceSink},
    config::EngineConfig,
    errors::DecisionError,
    maturity::MaturityStage,
    models::{AgentState, DecisionRequest, DecisionResponse, DecisionTrace, MentalHealthSnapshot},
    orchestrator::{
        performance::{EngineStatus, PerformanceSnapshot},
        DecisionOrchestrator,
    },
    telemetry::DecisionTelemetry,
};

#[derive(Debug, Clone)]
enum TraceBackend {
    Memory(MemoryTraceSink),
    Jsonl(JsonlTraceSink),
}

/// Orchestrator wired to in-process collaborators, ready to run cycles.
#[derive(Debug, Clone)]
pub struct DecisionRuntime {
    orchestrator: Arc<DecisionOrchestrator>,
    store: MemoryStateStore,
    traces: TraceBackend,
    bus: Arc<MemoryEventBus>,
}

impl DecisionRuntime {
    /// Bootstraps the runtime with in-memory store, traces, and event bus.
    #[must_use]
    pub fn bootstrap(config: EngineConfig) -> Self {
        let traces = MemoryTraceSink::new();
        let bus = Arc::new(MemoryEventBus::default());
        let telemetry = DecisionTelemetry::builder("sam.decision.runtime")
            .event_publisher(bus.clone())
            .build()
            .ok();
        Self::assemble(config, TraceBackend::Memory(traces), bus, telemetry)
    }

    /// Bootstraps the runtime writing traces and operational logs as JSON lines under `dir`.
    pub fn bootstrap_with_logs(config: EngineConfig, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let traces = JsonlTraceSink::new(dir.join("traces.jsonl"))?;
        let bus = Arc::new(MemoryEventBus::default());
        let telemetry = DecisionTelemetry::builder("sam.decision.runtime")
            .log_path(dir.join("decision.log.jsonl"))
            .event_publisher(bus.clone())
            .build()?;
        Ok(Self::assemble(
            config,
            TraceBackend::Jsonl(traces),
            bus,
            Some(telemetry),
        ))
    }

    /// Loads a TOML configuration file and bootstraps in memory.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = EngineConfig::load(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?;
        Ok(Self::bootstrap(config))
    }

    fn assemble(
        config: EngineConfig,
        traces: TraceBackend,
        bus: Arc<MemoryEventBus>,
        telemetry: Option<DecisionTelemetry>,
    ) -> Self {
        let store = MemoryStateStore::new();
        let mut orchestrator =
            DecisionOrchestrator::new(config).with_state_store(Arc::new(store.clone()));
        orchestrator = match &traces {
            TraceBackend::Memory(sink) => orchestrator.with_trace_sink(Arc::new(sink.clone())),
            TraceBackend::Jsonl(sink) => orchestrator.with_trace_sink(Arc::new(sink.clone())),
        };
        if let Some(tel) = telemetry {
            orchestrator = orchestrator.with_telemetry(tel);
        }
        Self {
            orchestrator: Arc::new(orchestrator),
            store,
            traces,
            bus,
        }
    }

    /// Orchestrator driving the cycles.
    #[must_use]
    pub fn orchestrator(&self) -> &DecisionOrchestrator {
        &self.orchestrator
    }

    /// Runs one decision cycle.
    pub async fn run(&self, request: DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        self.orchestrator.decide(request).await
    }

    /// Runs requests concurrently, returning results in request order.
    pub async fn run_batch(
        &self,
        requests: Vec<DecisionRequest>,
    ) -> Vec<Result<DecisionResponse, DecisionError>> {
        join_all(
            requests
                .into_iter()
                .map(|request| self.orchestrator.decide(request)),
        )
        .await
    }

    /// Places an agent at a stage, replacing any stored state.
    pub fn seed_agent(&self, agent: impl Into<String>, stage: MaturityStage) -> u64 {
        self.store
            .seed(agent, AgentState::at_stage(stage, Utc::now()))
    }

    /// Latest stored state for an agent.
    #[must_use]
    pub fn agent_state(&self, agent: &str) -> Option<AgentState> {
        self.store.snapshot(agent)
    }

    /// Clears an agent's behavioral state, keeping its maturity.
    pub async fn reset_mental_health(&self, agent: &str) -> Result<MentalHealthSnapshot> {
        self.orchestrator.reset_mental_health(agent).await
    }

    /// Operator status for an agent, including engine-wide counters.
    pub async fn status(&self, agent: &str) -> Result<EngineStatus> {
        self.orchestrator.status(agent).await
    }

    /// Engine-wide request counters.
    #[must_use]
    pub fn performance(&self) -> PerformanceSnapshot {
        self.orchestrator.performance()
    }

    /// Every trace emitted so far.
    pub fn traces(&self) -> Result<Vec<DecisionTrace>> {
        match &self.traces {
            TraceBackend::Memory(sink) => Ok(sink.traces()),
            TraceBackend::Jsonl(sink) => sink.read_all(),
        }
    }

    /// Recent events retained by the in-memory bus.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.bus.snapshot()
    }
}

/// Runs a demonstration loop with delays, intended for integration tests.
pub async fn demo_run(iterations: usize) -> Result<Vec<DecisionResponse>> {
    let runtime = DecisionRuntime::bootstrap(EngineConfig::default());
    let goals = [
        "summarize the weekly report",
        "find the latest invoice",
        "draft a reply to the vendor",
        "analyze support ticket trends",
    ];
    let mut responses = Vec::with_capacity(iterations);
    for index in 0..iterations {
        let goal = goals[index % goals.len()];
        let request = DecisionRequest::new(goal)
            .for_agent("demo")
            .with_urgency(0.3)
            .with_complexity(0.25);
        responses.push(runtime.run(request).await?);
        sleep(Duration::from_millis(10)).await;
    }
    Ok(responses)
}
