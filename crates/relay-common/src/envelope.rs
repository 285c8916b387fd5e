//! The generic event envelope carried by the platform's push stream.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One pushed event, as delivered on the wire. Immutable once decoded.
///
/// `event` stays opaque at this layer; the business handler selected by
/// `header.event_type` is responsible for parsing it.
#[derive(Debug, Deserialize, Serialize)]
pub struct EventEnvelope {
    /// Protocol schema version of the envelope itself.
    #[serde(default)]
    pub schema: String,

    /// Routing and authentication metadata.
    #[serde(default)]
    pub header: EventHeader,

    /// Opaque, handler-specific payload.
    pub event: Box<RawValue>,
}

/// Envelope header. Absent fields decode to empty strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventHeader {
    #[serde(default)]
    pub event_id: String,

    /// Event kind, e.g. `metric.report.v1`. Selects the business handler.
    #[serde(default)]
    pub event_type: String,

    /// Epoch milliseconds at which the platform emitted the event.
    #[serde(default)]
    pub create_time: String,

    /// Verification token; compared against the configured secret when
    /// token checks are enabled.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub tenant_key: String,
}
