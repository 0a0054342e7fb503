//! Call, mute and peer-mode handling
//!
//! Decides when ducking should be running at all. Calls and unmuting
//! start it; hanging up and muting stop it, except that a hang-up while
//! the peer USB-mode macro has the room in USB mode leaves it running.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// App name the USB-mode peer posts status under
pub const USB_MODE_APP: &str = "USB_Mode_Version_3";

/// External signals that affect whether monitoring runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeSignal {
    CallConnected,
    CallDisconnected,
    MuteOn,
    MuteOff,
    /// Status message from a peer macro
    Peer(PeerMessage),
}

/// Status or error posted by a peer macro
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub app: String,
    pub kind: PeerMessageKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerMessageKind {
    Status,
    Error,
}

/// What the state machine should do about a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringCommand {
    Start,
    Stop,
}

/// Tracks USB mode and maps signals to start/stop commands
#[derive(Debug, Default)]
pub struct ModeCoordinator {
    usb_mode: bool,
}

impl ModeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn usb_mode(&self) -> bool {
        self.usb_mode
    }

    pub fn translate(&mut self, signal: &ModeSignal) -> Option<MonitoringCommand> {
        match signal {
            ModeSignal::CallConnected => {
                info!("call connected");
                Some(MonitoringCommand::Start)
            }
            ModeSignal::CallDisconnected => {
                info!(usb_mode = self.usb_mode, "call disconnected");
                if self.usb_mode {
                    None
                } else {
                    Some(MonitoringCommand::Stop)
                }
            }
            ModeSignal::MuteOn => {
                info!("microphones muted");
                Some(MonitoringCommand::Stop)
            }
            ModeSignal::MuteOff => {
                info!("microphones unmuted");
                Some(MonitoringCommand::Start)
            }
            ModeSignal::Peer(message) => self.translate_peer(message),
        }
    }

    fn translate_peer(&mut self, message: &PeerMessage) -> Option<MonitoringCommand> {
        if message.app != USB_MODE_APP {
            debug!(app = %message.app, "message from peer not processed");
            return None;
        }

        if message.kind == PeerMessageKind::Error {
            error!(value = %message.value, "USB mode peer reported an error");
            return None;
        }

        match message.value.as_str() {
            "EnteringWebexMode" => {
                warn!("entering default mode");
                None
            }
            "WebexModeStarted" => {
                warn!("system is in default mode");
                self.usb_mode = false;
                Some(MonitoringCommand::Stop)
            }
            "enteringUSBMode" => {
                warn!("entering USB mode");
                None
            }
            "USBModeStarted" => {
                warn!("system is in USB mode");
                self.usb_mode = true;
                Some(MonitoringCommand::Start)
            }
            other => {
                debug!(value = other, "unhandled USB mode status");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(value: &str) -> ModeSignal {
        ModeSignal::Peer(PeerMessage {
            app: USB_MODE_APP.to_string(),
            kind: PeerMessageKind::Status,
            value: value.to_string(),
        })
    }

    #[test]
    fn test_call_lifecycle() {
        let mut coordinator = ModeCoordinator::new();
        assert_eq!(
            coordinator.translate(&ModeSignal::CallConnected),
            Some(MonitoringCommand::Start)
        );
        assert_eq!(
            coordinator.translate(&ModeSignal::CallDisconnected),
            Some(MonitoringCommand::Stop)
        );
    }

    #[test]
    fn test_mute() {
        let mut coordinator = ModeCoordinator::new();
        assert_eq!(coordinator.translate(&ModeSignal::MuteOn), Some(MonitoringCommand::Stop));
        assert_eq!(coordinator.translate(&ModeSignal::MuteOff), Some(MonitoringCommand::Start));
    }

    #[test]
    fn test_usb_mode_survives_hangup() {
        let mut coordinator = ModeCoordinator::new();
        assert_eq!(coordinator.translate(&usb("USBModeStarted")), Some(MonitoringCommand::Start));
        assert!(coordinator.usb_mode());
        assert_eq!(coordinator.translate(&ModeSignal::CallDisconnected), None);

        assert_eq!(coordinator.translate(&usb("WebexModeStarted")), Some(MonitoringCommand::Stop));
        assert!(!coordinator.usb_mode());
        assert_eq!(
            coordinator.translate(&ModeSignal::CallDisconnected),
            Some(MonitoringCommand::Stop)
        );
    }

    #[test]
    fn test_transitional_and_foreign_messages_ignored() {
        let mut coordinator = ModeCoordinator::new();
        assert_eq!(coordinator.translate(&usb("enteringUSBMode")), None);
        assert_eq!(coordinator.translate(&usb("EnteringWebexMode")), None);

        let foreign = ModeSignal::Peer(PeerMessage {
            app: "Room_Presets".to_string(),
            kind: PeerMessageKind::Status,
            value: "USBModeStarted".to_string(),
        });
        assert_eq!(coordinator.translate(&foreign), None);

        let failure = ModeSignal::Peer(PeerMessage {
            app: USB_MODE_APP.to_string(),
            kind: PeerMessageKind::Error,
            value: "USBModeStarted".to_string(),
        });
        assert_eq!(coordinator.translate(&failure), None);
        assert!(!coordinator.usb_mode());
    }

    #[test]
    fn test_signal_deserialization() {
        let json = r#"{"type":"peer","app":"USB_Mode_Version_3","kind":"status","value":"USBModeStarted"}"#;
        let signal: ModeSignal = serde_json::from_str(json).unwrap();
        assert_eq!(signal, usb("USBModeStarted"));

        let signal: ModeSignal = serde_json::from_str(r#"{"type":"mute_on"}"#).unwrap();
        assert_eq!(signal, ModeSignal::MuteOn);
    }
}
