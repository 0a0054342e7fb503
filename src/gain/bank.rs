//! Ordered per-mic gain bookkeeping for the ceiling microphones

use std::collections::BTreeMap;

use crate::levels::MicrophoneId;

use super::Gain;

/// Resting level and fade position of one ceiling mic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CeilingChannel {
    pub mic: MicrophoneId,
    /// Level to return to when not ducked; `None` until a real read or stored record supplies it
    pub baseline: Option<Gain>,
    /// Level the fade-in has reached so far
    pub fade: Gain,
}

/// Ceiling mics in configuration order, keyed by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeilingBank {
    channels: Vec<CeilingChannel>,
}

impl CeilingBank {
    pub fn new(mics: &[MicrophoneId]) -> Self {
        let channels = mics
            .iter()
            .map(|&mic| CeilingChannel {
                mic,
                baseline: None,
                fade: 0,
            })
            .collect();
        Self { channels }
    }

    pub fn ids(&self) -> Vec<MicrophoneId> {
        self.channels.iter().map(|c| c.mic).collect()
    }

    /// Every baseline in order, or `None` while any mic is still unknown
    pub fn baselines(&self) -> Option<Vec<Gain>> {
        self.channels.iter().map(|c| c.baseline).collect()
    }

    /// Mics whose baseline is still unknown
    pub fn missing(&self) -> Vec<MicrophoneId> {
        self.channels
            .iter()
            .filter(|c| c.baseline.is_none())
            .map(|c| c.mic)
            .collect()
    }

    /// Known baselines as a map
    pub fn baseline_map(&self) -> BTreeMap<MicrophoneId, Gain> {
        self.channels
            .iter()
            .filter_map(|c| c.baseline.map(|b| (c.mic, b)))
            .collect()
    }

    pub fn get_mut(&mut self, mic: MicrophoneId) -> Option<&mut CeilingChannel> {
        self.channels.iter_mut().find(|c| c.mic == mic)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CeilingChannel> {
        self.channels.iter_mut()
    }

    /// True once every fade has reached its baseline
    pub fn is_converged(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c.baseline.map_or(true, |b| c.fade >= b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u8]) -> Vec<MicrophoneId> {
        raw.iter().map(|&id| MicrophoneId::new(id).unwrap()).collect()
    }

    #[test]
    fn test_keeps_configuration_order() {
        let bank = CeilingBank::new(&ids(&[4, 1, 3]));
        assert_eq!(bank.ids(), ids(&[4, 1, 3]));
    }

    #[test]
    fn test_unknown_until_every_mic_is_set() {
        let mut bank = CeilingBank::new(&ids(&[1, 2]));
        assert_eq!(bank.baselines(), None);
        assert_eq!(bank.missing(), ids(&[1, 2]));

        bank.get_mut(MicrophoneId::new(2).unwrap()).unwrap().baseline = Some(30);
        assert_eq!(bank.baselines(), None);
        assert_eq!(bank.missing(), ids(&[1]));
        assert_eq!(bank.baseline_map().len(), 1);

        bank.get_mut(MicrophoneId::new(1).unwrap()).unwrap().baseline = Some(28);
        assert_eq!(bank.baselines(), Some(vec![28, 30]));
        assert!(bank.missing().is_empty());
    }

    #[test]
    fn test_convergence() {
        let mut bank = CeilingBank::new(&ids(&[1, 2]));
        for channel in bank.iter_mut() {
            channel.baseline = Some(30);
            channel.fade = 30;
        }
        assert!(bank.is_converged());

        bank.get_mut(MicrophoneId::new(1).unwrap()).unwrap().fade = 29;
        assert!(!bank.is_converged());
    }
}
