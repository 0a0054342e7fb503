//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::DuckerEvent;
use crate::gain::Gain;
use crate::levels::MicrophoneId;
use crate::mode::ModeSignal;
use crate::state::DuckingState;

/// Requests from the bridge to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to event notifications
    Subscribe,

    /// VU meter reading
    Sample { mic: MicrophoneId, level: u32 },

    /// Call, mute or peer-mode signal
    Signal { signal: ModeSignal },

    /// Current hardware level of a mic
    ReportGain { mic: MicrophoneId, gain: Gain },
}

/// Responses from daemon to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DuckerStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Input queued for the state machine
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event(DuckerEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuckerStatus {
    /// Daemon version
    pub version: String,

    /// Current ducking state
    pub state: DuckingState,

    /// Whether samples are being acted on
    pub monitoring: bool,

    /// Last published ceiling mic gains
    pub gains: BTreeMap<MicrophoneId, Gain>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DuckerStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DuckingState::default(),
            monitoring: false,
            gains: BTreeMap::new(),
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_request() {
        let json = r#"{"type":"sample","mic":5,"level":41}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::Sample { level: 41, .. }));
    }

    #[test]
    fn test_signal_request() {
        let json = r#"{"type":"signal","signal":{"type":"call_connected"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(
            req,
            Request::Signal { signal: ModeSignal::CallConnected }
        ));
    }

    #[test]
    fn test_invalid_mic_rejected() {
        let json = r#"{"type":"report_gain","mic":0,"gain":30}"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DuckerStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("idle"));
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event(DuckerEvent::MonitoringStopped);
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("MONITORING_STOPPED"));
    }
}
