//! Events module for status notifications
//!
//! Everything the ducker tells the outside world goes through one
//! broadcast channel as a `DuckerEvent`: gain changes, state transitions,
//! sample-source control and user alerts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gain::Gain;
use crate::levels::MicrophoneId;
use crate::state::DuckingState;

/// Events emitted by the ducker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuckerEvent {
    /// A bulk gain operation finished issuing its writes
    GainsAltered {
        /// New gain per ceiling microphone
        values: BTreeMap<MicrophoneId, Gain>,
    },

    /// One hardware write, including every fade-in step
    GainSet { mic: MicrophoneId, gain: Gain },

    /// The ducking state machine moved
    StateChanged {
        from: DuckingState,
        to: DuckingState,
    },

    /// VU metering should run for these mics
    MonitoringStarted {
        mics: Vec<MicrophoneId>,
        interval_ms: u64,
    },

    /// All VU metering should stop
    MonitoringStopped,

    /// Show an alert on the room's touch panel
    AlertShown {
        title: String,
        text: String,
        /// 0 keeps the alert until it is cleared
        duration_secs: u32,
    },

    /// Clear the touch panel alert
    AlertCleared,
}

impl DuckerEvent {
    pub fn alert(title: impl Into<String>, text: impl Into<String>, duration_secs: u32) -> Self {
        DuckerEvent::AlertShown {
            title: title.into(),
            text: text.into(),
            duration_secs,
        }
    }
}

impl std::fmt::Display for DuckerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuckerEvent::GainsAltered { values } => write!(f, "GAINS_ALTERED ({} mics)", values.len()),
            DuckerEvent::GainSet { mic, gain } => write!(f, "GAIN_SET ({} = {})", mic, gain),
            DuckerEvent::StateChanged { from, to } => write!(f, "STATE_CHANGED ({} -> {})", from, to),
            DuckerEvent::MonitoringStarted { mics, interval_ms } => {
                write!(f, "MONITORING_STARTED ({} mics @ {}ms)", mics.len(), interval_ms)
            }
            DuckerEvent::MonitoringStopped => write!(f, "MONITORING_STOPPED"),
            DuckerEvent::AlertShown { title, .. } => write!(f, "ALERT_SHOWN ({})", title),
            DuckerEvent::AlertCleared => write!(f, "ALERT_CLEARED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gains_altered_shape() {
        let mut values = BTreeMap::new();
        values.insert(MicrophoneId::new(1).unwrap(), 23);
        values.insert(MicrophoneId::new(2).unwrap(), 0);
        let event = DuckerEvent::GainsAltered { values };

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"action":"GAINS_ALTERED","values":{"1":23,"2":0}}"#);
    }

    #[test]
    fn test_gain_set_shape() {
        let event = DuckerEvent::GainSet {
            mic: MicrophoneId::new(3).unwrap(),
            gain: 26,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"action":"GAIN_SET","mic":3,"gain":26}"#);
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"action":"STATE_CHANGED","from":"ducking","to":"fading_in"}"#;
        let event: DuckerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            DuckerEvent::StateChanged {
                from: DuckingState::Ducking,
                to: DuckingState::FadingIn,
            }
        );
    }
}
