//! Microphone identifiers and VU level samples

use serde::{Deserialize, Serialize};

/// Lowest physical microphone input on the codec
pub const MIN_MIC_ID: u8 = 1;
/// Highest physical microphone input on the codec
pub const MAX_MIC_ID: u8 = 8;

/// A physical microphone input connector (1..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MicrophoneId(u8);

impl MicrophoneId {
    /// Create an id, rejecting connectors outside 1..=8
    pub fn new(id: u8) -> Result<Self, InvalidMicrophoneId> {
        if (MIN_MIC_ID..=MAX_MIC_ID).contains(&id) {
            Ok(Self(id))
        } else {
            Err(InvalidMicrophoneId(id))
        }
    }

    #[cfg(test)]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for MicrophoneId {
    type Error = InvalidMicrophoneId;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<MicrophoneId> for u8 {
    fn from(id: MicrophoneId) -> Self {
        id.0
    }
}

impl std::fmt::Display for MicrophoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mic{}", self.0)
    }
}

/// Connector number outside the codec's microphone inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("microphone id {0} is outside 1..=8")]
pub struct InvalidMicrophoneId(pub u8);

/// One VU meter reading for one microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSample {
    pub mic: MicrophoneId,
    pub level: u32,
}

impl LevelSample {
    pub fn new(mic: MicrophoneId, level: u32) -> Self {
        Self { mic, level }
    }
}
