//! Debounced hysteresis over amplified microphone levels
//!
//! Turns the VU stream of the amplified microphones into two edges:
//! someone started talking (`EnterDucking`) and that talker went quiet
//! (`ExitDucking`). Entry and exit each need a run of consecutive
//! qualifying samples, and release is only counted against the microphone
//! that is currently latched as the loud one.

use tracing::{debug, trace};

use crate::config::Thresholds;

use super::sample::{LevelSample, MicrophoneId};

/// Edge produced when a debounce counter completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    EnterDucking,
    ExitDucking,
}

/// Consecutive-sample counters for both debounce phases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceCounters {
    pub attack_frames: u32,
    pub release_frames: u32,
}

/// Hysteresis engine feeding the ducking state machine
#[derive(Debug)]
pub struct LevelClassifier {
    thresholds: Thresholds,
    counters: DebounceCounters,
    last_loud_mic: Option<MicrophoneId>,
}

impl LevelClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            counters: DebounceCounters::default(),
            last_loud_mic: None,
        }
    }

    #[cfg(test)]
    pub fn counters(&self) -> DebounceCounters {
        self.counters
    }

    #[cfg(test)]
    pub fn last_loud_mic(&self) -> Option<MicrophoneId> {
        self.last_loud_mic
    }

    /// Forget any half-counted attack or release
    pub fn reset(&mut self) {
        self.counters = DebounceCounters::default();
        self.last_loud_mic = None;
    }

    /// Feed one sample; `ducking` is whether the ceiling mics are currently ducked.
    ///
    /// At most one counter rule applies per sample, then the completed-run
    /// checks decide whether an edge fires.
    pub fn classify(&mut self, sample: &LevelSample, ducking: bool) -> Option<Edge> {
        let t = &self.thresholds;
        let level = sample.level;
        let is_last_loud = self.last_loud_mic == Some(sample.mic);

        if !ducking && level > t.attack_level && self.counters.attack_frames < t.attack_frames {
            self.counters.attack_frames += 1;
            self.last_loud_mic = Some(sample.mic);
        } else if !ducking && level < t.attack_level && is_last_loud {
            // candidate talker dropped out before the attack completed
            self.counters.attack_frames = 0;
        } else if ducking
            && level < t.release_level
            && is_last_loud
            && self.counters.release_frames < t.release_frames
        {
            self.counters.release_frames += 1;
        } else if ducking && level > t.release_level {
            self.counters.release_frames = 0;
            self.last_loud_mic = Some(sample.mic);
        }

        trace!(
            mic = %sample.mic,
            level,
            attack_frames = self.counters.attack_frames,
            release_frames = self.counters.release_frames,
            "sample classified"
        );

        if !ducking && self.counters.attack_frames == t.attack_frames {
            self.counters.attack_frames = 0;
            self.last_loud_mic = Some(sample.mic);
            debug!(mic = %sample.mic, "attack complete");
            return Some(Edge::EnterDucking);
        }

        if ducking && self.counters.release_frames == t.release_frames {
            self.counters.release_frames = 0;
            self.last_loud_mic = None;
            debug!(mic = %sample.mic, "release complete");
            return Some(Edge::ExitDucking);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mic(id: u8) -> MicrophoneId {
        MicrophoneId::new(id).unwrap()
    }

    fn sample(id: u8, level: u32) -> LevelSample {
        LevelSample::new(mic(id), level)
    }

    fn classifier() -> LevelClassifier {
        LevelClassifier::new(Thresholds::default())
    }

    /// Drive a sequence, flipping `ducking` on the edges the way the state machine does
    fn drive(c: &mut LevelClassifier, ducking: &mut bool, samples: &[LevelSample]) -> Vec<Option<Edge>> {
        samples
            .iter()
            .map(|s| {
                let edge = c.classify(s, *ducking);
                match edge {
                    Some(Edge::EnterDucking) => *ducking = true,
                    Some(Edge::ExitDucking) => *ducking = false,
                    None => {}
                }
                edge
            })
            .collect()
    }

    #[test]
    fn test_attack_fires_on_third_loud_sample() {
        let mut c = classifier();
        assert_eq!(c.classify(&sample(5, 41), false), None);
        assert_eq!(c.classify(&sample(5, 41), false), None);
        assert_eq!(c.classify(&sample(5, 41), false), Some(Edge::EnterDucking));
        assert_eq!(c.counters().attack_frames, 0);
        assert_eq!(c.last_loud_mic(), Some(mic(5)));
    }

    #[test]
    fn test_quiet_sample_aborts_attack() {
        let mut c = classifier();
        c.classify(&sample(5, 41), false);
        c.classify(&sample(5, 41), false);
        assert_eq!(c.classify(&sample(5, 10), false), None);
        assert_eq!(c.counters().attack_frames, 0);

        // needs a full new run
        assert_eq!(c.classify(&sample(5, 41), false), None);
        assert_eq!(c.classify(&sample(5, 41), false), None);
        assert_eq!(c.classify(&sample(5, 41), false), Some(Edge::EnterDucking));
    }

    #[test]
    fn test_quiet_sample_from_other_mic_keeps_attack() {
        let mut c = classifier();
        c.classify(&sample(5, 41), false);
        c.classify(&sample(6, 5), false);
        assert_eq!(c.counters().attack_frames, 1);
    }

    #[test]
    fn test_level_equal_to_threshold_is_neutral() {
        let mut c = classifier();
        c.classify(&sample(5, 41), false);
        c.classify(&sample(5, 40), false);
        assert_eq!(c.counters().attack_frames, 1);
    }

    #[test]
    fn test_release_fires_on_third_quiet_sample() {
        let mut c = classifier();
        let mut ducking = false;
        drive(&mut c, &mut ducking, &[sample(5, 41), sample(5, 41), sample(5, 41)]);
        assert!(ducking);

        let edges = drive(&mut c, &mut ducking, &[sample(5, 19), sample(5, 19), sample(5, 19)]);
        assert_eq!(edges, vec![None, None, Some(Edge::ExitDucking)]);
        assert!(!ducking);
        assert_eq!(c.last_loud_mic(), None);
        assert_eq!(c.counters(), DebounceCounters::default());
    }

    #[test]
    fn test_loud_sample_restarts_release() {
        let mut c = classifier();
        let mut ducking = false;
        drive(&mut c, &mut ducking, &[sample(5, 41), sample(5, 41), sample(5, 41)]);
        drive(&mut c, &mut ducking, &[sample(5, 19), sample(5, 19)]);
        assert_eq!(c.counters().release_frames, 2);

        c.classify(&sample(5, 30), true);
        assert_eq!(c.counters().release_frames, 0);
    }

    #[test]
    fn test_dip_on_other_mic_does_not_count_toward_release() {
        let mut c = classifier();
        let mut ducking = false;
        drive(&mut c, &mut ducking, &[sample(5, 41), sample(5, 41), sample(5, 41)]);

        let edges = drive(&mut c, &mut ducking, &[sample(6, 0), sample(6, 0), sample(6, 0), sample(6, 0)]);
        assert!(edges.iter().all(Option::is_none));
        assert_eq!(c.counters().release_frames, 0);
        assert!(ducking);
    }

    #[test]
    fn test_other_loud_mic_takes_over_release_tracking() {
        let mut c = classifier();
        let mut ducking = false;
        drive(&mut c, &mut ducking, &[sample(5, 41), sample(5, 41), sample(5, 41)]);
        drive(&mut c, &mut ducking, &[sample(5, 10), sample(5, 10)]);

        c.classify(&sample(6, 35), true);
        assert_eq!(c.last_loud_mic(), Some(mic(6)));
        assert_eq!(c.counters().release_frames, 0);

        // mic 5 going quiet no longer releases; mic 6 has to
        let edges = drive(&mut c, &mut ducking, &[sample(5, 0), sample(5, 0), sample(5, 0)]);
        assert!(edges.iter().all(Option::is_none));
        let edges = drive(&mut c, &mut ducking, &[sample(6, 0), sample(6, 0), sample(6, 0)]);
        assert_eq!(edges[2], Some(Edge::ExitDucking));
    }

    #[test]
    fn test_counters_stay_within_bounds() {
        let mut c = classifier();
        let mut ducking = false;
        let t = Thresholds::default();
        let levels = [41, 41, 0, 45, 50, 50, 19, 2, 21, 0, 0, 0, 60, 60, 60, 3, 3, 3, 3, 40, 20];
        for (n, level) in levels.iter().cycle().take(500).enumerate() {
            let id = if n % 7 == 0 { 6 } else { 5 };
            drive(&mut c, &mut ducking, &[sample(id, *level)]);
            let counters = c.counters();
            assert!(counters.attack_frames <= t.attack_frames);
            assert!(counters.release_frames <= t.release_frames);
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut c = classifier();
        c.classify(&sample(5, 41), false);
        c.reset();
        assert_eq!(c.counters(), DebounceCounters::default());
        assert_eq!(c.last_loud_mic(), None);
    }
}
