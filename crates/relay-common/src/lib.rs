//! Shared wire types for the relay workspace.
//!
//! The platform pushes events to the agent as text-encoded envelopes; this
//! crate holds the envelope itself plus the payload types of the event kinds
//! the agent understands. Everything here is plain data — decoding,
//! verification, and dispatch live in `relay-agent`.

pub mod envelope;
pub mod metric;

pub use envelope::{EventEnvelope, EventHeader};
pub use metric::{MetricEventData, MetricObservation, MetricType, EVENT_TYPE_METRIC_REPORT};
