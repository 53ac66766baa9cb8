use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_logging::{read_json_lines, JsonLogger};
use uuid::Uuid;

use super::TraceSink;
use crate::models::DecisionTrace;

/// Keeps traces in memory for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    traces: Arc<RwLock<Vec<DecisionTrace>>>,
}

impl MemoryTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every trace in emission order.
    #[must_use]
    pub fn traces(&self) -> Vec<DecisionTrace> {
        self.traces.read().clone()
    }

    /// Looks a trace up by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<DecisionTrace> {
        self.traces.read().iter().find(|trace| trace.id == id).cloned()
    }

    /// Number of traces held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.read().len()
    }

    /// Whether no trace was emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.read().is_empty()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn log_decision_trace(&self, trace: &DecisionTrace) -> Result<()> {
        self.traces.write().push(trace.clone());
        Ok(())
    }
}

/// Appends traces as JSON lines.
#[derive(Debug, Clone)]
pub struct JsonlTraceSink {
    logger: Arc<JsonLogger>,
}

impl JsonlTraceSink {
    /// Opens (or creates) the trace file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let logger = JsonLogger::new(path)
            .with_context(|| format!("opening trace sink {}", path.display()))?;
        Ok(Self {
            logger: Arc::new(logger),
        })
    }

    /// Reads every trace written so far.
    pub fn read_all(&self) -> Result<Vec<DecisionTrace>> {
        read_json_lines(self.logger.path())
    }
}

#[async_trait]
impl TraceSink for JsonlTraceSink {
    async fn log_decision_trace(&self, trace: &DecisionTrace) -> Result<()> {
        self.logger.append(trace)
    }
}
