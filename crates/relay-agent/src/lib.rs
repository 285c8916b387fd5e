//! Relay agent: bridges an application platform's event stream to
//! Prometheus.
//!
//! The agent subscribes to the platform's push stream over a long-lived
//! websocket, ingests metric-report events, provisions time series for
//! them on first use, and serves everything on a pull `/metrics` endpoint.
//!
//! ## Modules
//!
//! - `config`: TOML configuration with environment overrides
//! - `registry`: dynamic collector registry (get-or-create, option overlay)
//! - `ingest`: envelope decode/verify and pluggable business handlers
//! - `observability`: the agent's own instruments
//! - `recovery`: panic isolation for fire-and-forget tasks
//! - `transport`: websocket subscription to the event stream
//! - `server`: HTTP surface (`/ping`, `/metrics`, `/alert`)
//! - `alert`: outbound alert notifier

pub mod alert;
pub mod config;
pub mod ingest;
pub mod observability;
pub mod recovery;
pub mod registry;
pub mod server;
pub mod transport;

pub use config::AgentConfig;
pub use ingest::{BizHandler, EventDispatcher, IngestError};
pub use observability::AgentMetrics;
pub use registry::{CollectorHandle, CollectorRegistry, RegistryError};
