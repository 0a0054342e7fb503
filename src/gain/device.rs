//! Hardware gain access
//!
//! The ducker never talks to the codec directly. It reads and writes
//! microphone levels through `GainDevice`; the daemon plugs in a
//! `MirrorGainDevice` whose table is kept in sync by the bridge process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::events::DuckerEvent;
use crate::levels::MicrophoneId;

use super::Gain;

/// Errors from a hardware gain request
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no gain known for {0}")]
    Unavailable(MicrophoneId),
}

/// Read/write access to a microphone input level, addressed by connector
#[async_trait]
pub trait GainDevice: Send + Sync {
    async fn get_gain(&self, mic: MicrophoneId) -> Result<Gain, DeviceError>;

    async fn set_gain(&self, mic: MicrophoneId, gain: Gain) -> Result<(), DeviceError>;
}

/// In-process mirror of the codec's microphone levels
///
/// Cloning shares the same table, so the IPC server can feed reported
/// levels in while the state machine reads and writes them. Every write
/// made through `set_gain` goes out as a `GAIN_SET` event for the bridge
/// to apply on the codec.
#[derive(Debug, Clone, Default)]
pub struct MirrorGainDevice {
    table: Arc<RwLock<HashMap<MicrophoneId, Gain>>>,
    outbound: Option<broadcast::Sender<DuckerEvent>>,
}

impl MirrorGainDevice {
    /// Create a mirror that already knows some levels
    pub fn with_gains(gains: &BTreeMap<MicrophoneId, Gain>) -> Self {
        let table = gains.iter().map(|(mic, gain)| (*mic, *gain)).collect();
        Self {
            table: Arc::new(RwLock::new(table)),
            outbound: None,
        }
    }

    /// Publish every write on this channel
    pub fn publishing(mut self, event_tx: broadcast::Sender<DuckerEvent>) -> Self {
        self.outbound = Some(event_tx);
        self
    }

    /// Record a level reported by the codec
    pub async fn report(&self, mic: MicrophoneId, gain: Gain) {
        debug!(%mic, gain, "gain reported");
        self.table.write().await.insert(mic, gain);
    }

    /// Current level of every known microphone
    #[cfg(test)]
    pub async fn snapshot(&self) -> BTreeMap<MicrophoneId, Gain> {
        self.table
            .read()
            .await
            .iter()
            .map(|(mic, gain)| (*mic, *gain))
            .collect()
    }
}

#[async_trait]
impl GainDevice for MirrorGainDevice {
    async fn get_gain(&self, mic: MicrophoneId) -> Result<Gain, DeviceError> {
        self.table
            .read()
            .await
            .get(&mic)
            .copied()
            .ok_or(DeviceError::Unavailable(mic))
    }

    async fn set_gain(&self, mic: MicrophoneId, gain: Gain) -> Result<(), DeviceError> {
        self.table.write().await.insert(mic, gain);
        if let Some(tx) = &self.outbound {
            let _ = tx.send(DuckerEvent::GainSet { mic, gain });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mirror_shares_table() {
        let mic = MicrophoneId::new(3).unwrap();
        let device = MirrorGainDevice::default();
        let bridge = device.clone();

        assert!(matches!(device.get_gain(mic).await, Err(DeviceError::Unavailable(_))));

        bridge.report(mic, 42).await;
        assert_eq!(device.get_gain(mic).await.unwrap(), 42);

        device.set_gain(mic, 35).await.unwrap();
        assert_eq!(bridge.snapshot().await.get(&mic), Some(&35));
    }

    #[tokio::test]
    async fn test_writes_are_published_reports_are_not() {
        let mic = MicrophoneId::new(2).unwrap();
        let (tx, mut rx) = broadcast::channel(8);
        let device = MirrorGainDevice::default().publishing(tx);

        device.report(mic, 30).await;
        assert!(rx.try_recv().is_err());

        device.set_gain(mic, 23).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), DuckerEvent::GainSet { mic, gain: 23 });
    }
}
