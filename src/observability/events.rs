//! Lifecycle event publishing.
//!
//! The router calls [`EventPublisher::publish`], which only enqueues on a
//! bounded channel. An [`EventWorker`] drains the queue into the configured
//! sinks. A full queue, a closed queue or a failing sink is logged and
//! counted; none of it reaches the response being returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::clock::now_millis;
use crate::config::EventsConfig;
use crate::error::GatewayError;
use crate::http::request::GatewayContext;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RateLimited,
    AuthFailed,
    BreakerOpen,
    Completed,
    Failed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RateLimited => "rate_limited",
            EventKind::AuthFailed => "auth_failed",
            EventKind::BreakerOpen => "breaker_open",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
        }
    }
}

/// A terminal outcome of one gateway request.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEvent {
    pub kind: EventKind,
    pub service_name: String,
    pub request_id: String,
    pub correlation_id: String,
    pub elapsed_ms: u64,
    pub timestamp_ms: u64,
    pub details: Value,
}

impl GatewayEvent {
    pub fn new(kind: EventKind, ctx: &GatewayContext, details: Value) -> Self {
        Self {
            kind,
            service_name: ctx.service_name.clone(),
            request_id: ctx.request_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            elapsed_ms: ctx.elapsed_ms(),
            timestamp_ms: now_millis(),
            details,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EventPublishError {
    #[error("event queue is full")]
    QueueFull,

    #[error("event queue is closed")]
    Closed,

    #[error("sink `{sink}` failed: {reason}")]
    Sink { sink: &'static str, reason: String },
}

impl EventPublishError {
    fn reason(&self) -> &'static str {
        match self {
            EventPublishError::QueueFull => "queue_full",
            EventPublishError::Closed => "closed",
            EventPublishError::Sink { .. } => "sink_error",
        }
    }
}

/// Destination for delivered events.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &GatewayEvent) -> Result<(), EventPublishError>;
}

/// Writes every event as a structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &GatewayEvent) -> Result<(), EventPublishError> {
        tracing::info!(
            target: "strategy_gateway::events",
            kind = event.kind.as_str(),
            service = %event.service_name,
            request_id = %event.request_id,
            correlation_id = %event.correlation_id,
            elapsed_ms = event.elapsed_ms,
            details = %event.details,
            "Gateway event"
        );
        Ok(())
    }
}

/// POSTs each event as JSON to an external collector.
#[derive(Debug)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &GatewayEvent) -> Result<(), EventPublishError> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map(|_| ())
            .map_err(|e| EventPublishError::Sink {
                sink: "webhook",
                reason: e.to_string(),
            })
    }
}

/// Cheap, cloneable handle used on the request path.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: Option<mpsc::Sender<GatewayEvent>>,
}

impl EventPublisher {
    /// Create a publisher and the worker that drains it.
    pub fn channel(buffer: usize) -> (Self, EventWorker) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx: Some(tx) }, EventWorker { rx, sinks: Vec::new() })
    }

    /// A publisher that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Build from config, with the log sink and an optional webhook sink.
    pub fn from_config(config: &EventsConfig) -> (Self, Option<EventWorker>) {
        if !config.enabled {
            return (Self::disabled(), None);
        }

        let (publisher, mut worker) = Self::channel(config.buffer_size);
        worker.add_sink(Arc::new(LogSink));

        if let Some(url) = &config.webhook_url {
            match WebhookSink::new(url, Duration::from_millis(config.webhook_timeout_ms)) {
                Ok(sink) => worker.add_sink(Arc::new(sink)),
                Err(e) => tracing::error!(url = %url, error = %e, "Failed to build webhook event sink"),
            }
        }
        (publisher, Some(worker))
    }

    /// Enqueue an event without waiting. Failures are logged and swallowed.
    pub fn publish(&self, event: GatewayEvent) {
        if let Err(e) = self.try_publish(event) {
            let err = GatewayError::EventPublishFailed(e.to_string());
            tracing::warn!(error = %err, "Dropping gateway event");
            metrics::record_event_dropped(e.reason());
        }
    }

    fn try_publish(&self, event: GatewayEvent) -> Result<(), EventPublishError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EventPublishError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EventPublishError::Closed,
        })
    }
}

/// Background task delivering queued events to sinks.
pub struct EventWorker {
    rx: mpsc::Receiver<GatewayEvent>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventWorker {
    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(sinks = self.sinks.len(), "Event worker starting");
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.deliver(&event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    // Flush what is already queued, then stop.
                    while let Ok(event) = self.rx.try_recv() {
                        self.deliver(&event).await;
                    }
                    tracing::info!("Event worker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn deliver(&self, event: &GatewayEvent) {
        metrics::record_event(event.kind.as_str());
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event).await {
                tracing::warn!(
                    sink = sink.name(),
                    request_id = %event.request_id,
                    error = %e,
                    "Event delivery failed"
                );
                metrics::record_event_dropped(e.reason());
            }
        }
    }
}
