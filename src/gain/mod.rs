//! Gain control for the ceiling microphones
//!
//! Wraps the hardware gain interface with the duck, restore and fade-in
//! operations the state machine drives.

mod bank;
mod controller;
mod device;

pub use controller::{FadeProgress, GainController};
pub use device::{GainDevice, MirrorGainDevice};

#[cfg(test)]
pub use device::DeviceError;

/// Microphone input level as the codec reports it
pub type Gain = i32;

/// Stand-in for a live reading of 0, which is never kept as a baseline.
///
/// Matches what deployed rooms already have stored.
pub const SENTINEL_GAIN: Gain = 8;
