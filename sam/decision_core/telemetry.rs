//! Telemetry handle shared by the orchestrator and runtime.
//!
//! Wraps an optional JSON-lines operational log and an optional event
//! publisher. Both are best effort: callers log a failure and carry on.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord, EventTopic};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Builder for decision telemetry.
pub struct DecisionTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl DecisionTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            event_publisher: None,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<DecisionTelemetry> {
        let logger = self.log_path.map(JsonLogger::new).transpose()?;
        Ok(DecisionTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Cloneable telemetry handle.
#[derive(Clone)]
pub struct DecisionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for DecisionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionTelemetry")
            .field("module", &self.inner.module)
            .field("logs", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl DecisionTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> DecisionTelemetryBuilder {
        DecisionTelemetryBuilder::new(module)
    }

    /// Logs structured metadata for an agent.
    pub fn log(&self, level: LogLevel, agent: &str, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message).for_agent(agent);
            if let Value::Object(fields) = metadata {
                record.metadata = fields;
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes an event on the bus.
    pub async fn event(&self, agent: &str, topic: EventTopic, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            publisher
                .publish(EventRecord::new(&self.inner.module, agent, topic, payload))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::read_json_lines;
    use tempfile::tempdir;

    #[tokio::test]
    async fn logs_and_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decision.log");
        let bus = Arc::new(MemoryEventBus::default());
        let telemetry = DecisionTelemetry::builder("sam.orchestrator")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();

        telemetry
            .log(LogLevel::Info, "agent-1", "decision.cycle.completed", json!({ "fallback_used": false }))
            .unwrap();
        telemetry
            .event("agent-1", EventTopic::Fallback, json!({ "cause": "budget_exceeded" }))
            .await
            .unwrap();

        let records: Vec<LogRecord> = read_json_lines(&path).unwrap();
        assert_eq!(records[0].agent.as_deref(), Some("agent-1"));
        assert_eq!(records[0].metadata["fallback_used"], json!(false));
        let events = bus.by_topic(EventTopic::Fallback);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "sam.orchestrator");
    }

    #[tokio::test]
    async fn silent_without_sinks() {
        let telemetry = DecisionTelemetry::builder("quiet").build().unwrap();
        telemetry.log(LogLevel::Warn, "a", "nothing", Value::Null).unwrap();
        telemetry
            .event("a", EventTopic::Intervention, Value::Null)
            .await
            .unwrap();
    }
}
