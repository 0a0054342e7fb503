//! Level classification for amplified microphones
//!
//! Provides the microphone id and sample types plus the debounced
//! hysteresis classifier that decides when ducking starts and ends.

mod classifier;
mod sample;

pub use classifier::{Edge, LevelClassifier};
pub use sample::{LevelSample, MicrophoneId};
