//! Bulk gain operations over the ceiling microphones
//!
//! Every bulk operation issues its writes in configuration order and then
//! posts a single `GAINS_ALTERED` event with the resulting levels. Device
//! failures are logged and skipped; the next bulk operation rewrites every
//! mic anyway. Mics whose baseline is still unknown are left alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::DuckerEvent;
use crate::levels::MicrophoneId;

use super::bank::CeilingBank;
use super::device::{DeviceError, GainDevice};
use super::{Gain, SENTINEL_GAIN};

/// Whether a fade step left anything still climbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeProgress {
    Stepping,
    Converged,
}

/// Reads, ducks, restores and fades the ceiling mic gains
pub struct GainController {
    device: Arc<dyn GainDevice>,
    bank: CeilingBank,
    ducking_value: Gain,
    fade_step: Gain,
    event_tx: broadcast::Sender<DuckerEvent>,
}

impl GainController {
    pub fn new(
        device: Arc<dyn GainDevice>,
        ceiling: &[MicrophoneId],
        ducking_value: Gain,
        fade_step: Gain,
        event_tx: broadcast::Sender<DuckerEvent>,
    ) -> Self {
        Self {
            device,
            bank: CeilingBank::new(ceiling),
            ducking_value,
            fade_step,
            event_tx,
        }
    }

    pub fn bank(&self) -> &CeilingBank {
        &self.bank
    }

    /// True once every ceiling mic has a baseline
    pub fn is_ready(&self) -> bool {
        self.bank.missing().is_empty()
    }

    /// Read a mic's current hardware level.
    ///
    /// A level of 0 comes back as `SENTINEL_GAIN`; a zero resting level is
    /// never trusted as a baseline.
    pub async fn read_live_gain(&self, mic: MicrophoneId) -> Result<Gain, DeviceError> {
        let level = self.device.get_gain(mic).await?;
        Ok(if level == 0 { SENTINEL_GAIN } else { level })
    }

    /// Re-read every ceiling mic into the in-memory baseline
    pub async fn refresh_baseline(&mut self) {
        for mic in self.bank.ids() {
            match self.read_live_gain(mic).await {
                Ok(level) => {
                    if let Some(channel) = self.bank.get_mut(mic) {
                        channel.baseline = Some(level);
                        channel.fade = level;
                    }
                }
                Err(e) => warn!(%mic, ?e, "live gain read failed, keeping previous baseline"),
            }
        }
        debug!(baseline = ?self.bank.baseline_map(), "baseline refreshed from hardware");
    }

    /// Take baselines from a stored record, positionally aligned with the bank
    pub fn adopt_baseline(&mut self, gains: &[Gain]) {
        for (channel, &gain) in self.bank.iter_mut().zip(gains) {
            channel.baseline = Some(gain);
            channel.fade = gain;
        }
    }

    /// Write one mic's level, flooring negative requests at 0
    pub async fn set_gain(&self, mic: MicrophoneId, value: Gain) {
        let value = value.max(0);
        if let Err(e) = self.device.set_gain(mic, value).await {
            warn!(%mic, value, ?e, "gain write failed");
        }
    }

    /// Drop every ceiling mic by the ducking amount and start fades from there
    pub async fn duck_all(&mut self) {
        info!("amplified mic active, ducking ceiling mics");
        let mut values = BTreeMap::new();
        for channel in self.bank.iter_mut() {
            let Some(baseline) = channel.baseline else {
                continue;
            };
            let ducked = (baseline - self.ducking_value).max(0);
            channel.fade = ducked;
            values.insert(channel.mic, ducked);
        }
        self.apply(&values).await;
        self.publish(values);
    }

    /// Put every ceiling mic straight back to its baseline
    pub async fn restore_all(&mut self) {
        info!("restoring ceiling mics to baseline");
        for channel in self.bank.iter_mut() {
            if let Some(baseline) = channel.baseline {
                channel.fade = baseline;
            }
        }
        let values = self.bank.baseline_map();
        self.apply(&values).await;
        self.publish(values);
    }

    /// Move every still-ducked mic one step toward its baseline.
    ///
    /// A mic climbs by the fade step while that does not pass its
    /// baseline, then by 1 at a time.
    pub async fn fade_step(&mut self) -> FadeProgress {
        let step = self.fade_step;
        let mut changed = Vec::new();
        for channel in self.bank.iter_mut() {
            let Some(baseline) = channel.baseline else {
                continue;
            };
            if channel.fade < baseline {
                channel.fade += if channel.fade + step <= baseline { step } else { 1 };
                changed.push((channel.mic, channel.fade));
            }
        }

        for (mic, level) in changed {
            self.set_gain(mic, level).await;
        }

        if self.bank.is_converged() {
            info!("fade-in complete, ceiling mics back at baseline");
            self.publish(self.bank.baseline_map());
            FadeProgress::Converged
        } else {
            FadeProgress::Stepping
        }
    }

    async fn apply(&self, values: &BTreeMap<MicrophoneId, Gain>) {
        for mic in self.bank.ids() {
            if let Some(&value) = values.get(&mic) {
                self.set_gain(mic, value).await;
            }
        }
    }

    fn publish(&self, values: BTreeMap<MicrophoneId, Gain>) {
        if values.is_empty() {
            return;
        }
        debug!(?values, "publishing gain change");
        // no listeners is fine, delivery is best-effort
        let _ = self.event_tx.send(DuckerEvent::GainsAltered { values });
    }
}
