//! Event ingestion pipeline.
//!
//! Raw frames from the transport are decoded into an [`EventEnvelope`],
//! optionally token-verified, then routed to the business handler
//! registered for the event kind. Unmarshal and validate run synchronously
//! on the inbound call; the business effect is scheduled through the
//! recovery boundary, so the call returns before the effect completes and
//! a faulty handler can never take down the transport loop.

pub mod metrics_handler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use relay_common::{EventEnvelope, EventHeader};

use crate::observability::AgentMetrics;
use crate::recovery::spawn_guarded;

/// Errors surfaced at the ingestion boundary. All of these abort the one
/// event synchronously and are returned to the caller.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed envelope or payload.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Token verification failed.
    #[error("illegal request: {0}")]
    Auth(String),

    /// Structurally invalid payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// No handler registered for the event kind.
    #[error("no handler registered for event type {0:?}")]
    NoHandler(String),
}

/// A business handler for one event kind.
///
/// A fresh handler is minted per event; `unmarshal` parses the envelope's
/// opaque payload into handler-owned state, `validate` checks its
/// structure, and `handle` performs the business effect asynchronously.
/// Item-level failures inside `handle` are fail-soft and must not abort
/// sibling items.
#[async_trait]
pub trait BizHandler: Send {
    fn unmarshal(&mut self, envelope: &EventEnvelope) -> Result<(), IngestError>;

    fn validate(&self) -> Result<(), IngestError>;

    async fn handle(self: Box<Self>) -> Result<(), IngestError>;
}

/// Mints a fresh [`BizHandler`] per inbound event.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn BizHandler> + Send + Sync>;

/// Routes decoded envelopes to business handlers by event kind.
pub struct EventDispatcher {
    handlers: HashMap<String, HandlerFactory>,
    metrics: Arc<AgentMetrics>,
    verify_token: Option<String>,
}

impl EventDispatcher {
    pub fn new(metrics: Arc<AgentMetrics>, verify_token: Option<String>) -> Self {
        Self {
            handlers: HashMap::new(),
            metrics,
            verify_token,
        }
    }

    /// Registers the handler factory for an event kind.
    pub fn register<F>(&mut self, event_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BizHandler> + Send + Sync + 'static,
    {
        self.handlers.insert(event_type.into(), Box::new(factory));
    }

    /// Ingests one raw frame.
    ///
    /// Decode, verification, unmarshal, and validate run here; the business
    /// effect is scheduled and this returns without waiting for it.
    /// Receipt latency and an outcome counter are recorded on every path.
    pub fn dispatch(&self, raw: &[u8]) -> Result<(), IngestError> {
        let started = Instant::now();
        let mut event_name = String::from("-");
        let mut schema = String::from("-");

        let result = self.dispatch_inner(raw, &mut event_name, &mut schema);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (is_error, error_msg) = match &result {
            Ok(()) => ("false", String::from("-")),
            Err(e) => ("true", e.to_string()),
        };
        self.metrics
            .event_receive_duration_ms
            .with_label_values(&[&event_name, &schema])
            .observe(elapsed_ms);
        self.metrics
            .event_receive_duration_ms_summary
            .with_label_values(&[&event_name, &schema])
            .observe(elapsed_ms);
        self.metrics
            .event_receive_total
            .with_label_values(&[&event_name, &schema, is_error, &error_msg])
            .inc();

        if let Err(e) = &result {
            error!(event_type = %event_name, error = %e, "event rejected");
        }
        result
    }

    fn dispatch_inner(
        &self,
        raw: &[u8],
        event_name: &mut String,
        schema: &mut String,
    ) -> Result<(), IngestError> {
        let envelope: EventEnvelope = serde_json::from_slice(raw)?;
        *schema = envelope.schema.clone();
        *event_name = envelope.header.event_type.clone();

        if let Some(secret) = &self.verify_token {
            verify_token(&envelope.header, secret)?;
        }

        let factory = self
            .handlers
            .get(&envelope.header.event_type)
            .ok_or_else(|| IngestError::NoHandler(envelope.header.event_type.clone()))?;

        let mut handler = factory();
        handler.unmarshal(&envelope)?;
        handler.validate()?;

        debug!(
            event_id = %envelope.header.event_id,
            event_type = %event_name,
            "event accepted"
        );

        spawn_guarded("event_handler", Arc::clone(&self.metrics), async move {
            if let Err(e) = handler.handle().await {
                error!(error = %e, "business handler failed");
            }
        });

        Ok(())
    }
}

/// Token check for inbound envelopes. Fails when the header token is
/// missing, the configured secret is empty, or the two differ.
pub fn verify_token(header: &EventHeader, secret: &str) -> Result<(), IngestError> {
    if header.token.is_empty() {
        return Err(IngestError::Auth("header token is missing".to_owned()));
    }
    if secret.is_empty() {
        return Err(IngestError::Auth(
            "configured verification token is empty".to_owned(),
        ));
    }
    if header.token != secret {
        return Err(IngestError::Auth(format!(
            "app {:?} presented a mismatched verification token",
            header.app_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(token: &str) -> EventHeader {
        EventHeader {
            token: token.to_owned(),
            app_id: "app-1".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn verify_accepts_matching_token() {
        assert!(verify_token(&header("secret"), "secret").is_ok());
    }

    #[test]
    fn verify_rejects_missing_header_token() {
        assert!(matches!(
            verify_token(&header(""), "secret"),
            Err(IngestError::Auth(_))
        ));
    }

    #[test]
    fn verify_rejects_empty_secret() {
        assert!(matches!(
            verify_token(&header("secret"), ""),
            Err(IngestError::Auth(_))
        ));
    }

    #[test]
    fn verify_rejects_mismatch() {
        assert!(matches!(
            verify_token(&header("other"), "secret"),
            Err(IngestError::Auth(_))
        ));
    }
}
