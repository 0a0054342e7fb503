//! Mode coordination
//!
//! Maps call lifecycle, mute state and peer-macro status messages onto
//! start/stop commands for the ducking state machine.

mod coordinator;

pub use coordinator::{ModeCoordinator, ModeSignal, MonitoringCommand};

#[cfg(test)]
pub use coordinator::{PeerMessage, PeerMessageKind, USB_MODE_APP};
