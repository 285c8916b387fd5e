//! Long-lived subscription to the platform's event push stream.
//!
//! Connects to the configured websocket endpoint, authenticates with the
//! app credentials, and feeds every text frame to the dispatcher. The
//! connection is kept alive with periodic pings and re-established with
//! exponential backoff after a drop. A rejected frame never tears down
//! the subscription.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::ingest::EventDispatcher;

const PING_INTERVAL: Duration = Duration::from_secs(15);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Errors that can occur on the event source connection.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("stream ended unexpectedly")]
    Closed,
}

/// Subscribe frame sent after connecting.
#[derive(Serialize)]
struct SubscribeFrame<'a> {
    op: &'static str,
    app_id: &'a str,
    app_secret: &'a str,
}

/// The event source subscription client.
pub struct EventSourceClient {
    config: SourceConfig,
    dispatcher: Arc<EventDispatcher>,
}

impl EventSourceClient {
    pub fn new(config: SourceConfig, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Runs the subscription with reconnection until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut reconnect_delay = Duration::from_secs(1);

        loop {
            if shutdown.try_recv().is_ok() {
                info!("event source: shutdown signal received");
                return;
            }

            match self.run_connection(&mut shutdown).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        error = %e,
                        delay_secs = reconnect_delay.as_secs(),
                        "event source connection lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_delay) => {}
                        _ = shutdown.recv() => {
                            info!("event source: shutdown signal received");
                            return;
                        }
                    }
                    reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                }
            }
        }
    }

    /// Runs one connection to completion. `Ok` means shutdown was
    /// requested; any error triggers a reconnect.
    async fn run_connection(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), SourceError> {
        let (stream, _) = connect_async(&self.config.endpoint)
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?;
        info!(endpoint = %self.config.endpoint, "event source connected");
        let (mut write, mut read) = stream.split();

        let subscribe = serde_json::to_string(&SubscribeFrame {
            op: "subscribe",
            app_id: &self.config.app_id,
            app_secret: &self.config.app_secret,
        })
        .map_err(|e| SourceError::WebSocket(e.to_string()))?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| SourceError::WebSocket(e.to_string()))?;

        let mut ping = interval(PING_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| SourceError::WebSocket(e.to_string()))?;
                }
                frame = read.next() => {
                    let message = frame
                        .ok_or(SourceError::Closed)?
                        .map_err(|e| SourceError::WebSocket(e.to_string()))?;
                    match message {
                        Message::Text(text) => {
                            // Decode/auth/validation failures are this
                            // frame's outcome, already counted by the
                            // dispatcher; the subscription stays up.
                            if let Err(e) = self.dispatcher.dispatch(text.as_bytes()) {
                                debug!(error = %e, "frame rejected");
                            }
                        }
                        Message::Ping(payload) => {
                            write
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|e| SourceError::WebSocket(e.to_string()))?;
                        }
                        Message::Close(_) => return Err(SourceError::Closed),
                        _ => {}
                    }
                }
            }
        }
    }
}
