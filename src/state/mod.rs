//! State machine module for ducking control
//!
//! Provides an explicit state machine with three states:
//! - Idle: ceiling mics at their baseline
//! - Ducking: ceiling mics lowered while an amplified mic is live
//! - FadingIn: ceiling mics stepping back up after release

mod machine;

pub use machine::{DuckingState, DuckingStateMachine, Input};
