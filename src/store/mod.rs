//! Durable baseline gains
//!
//! The resting level of each ceiling mic survives restarts as one named
//! record. A record only counts if its mic list is exactly the configured
//! ceiling list; anything else is thrown away and re-derived from hardware.

mod json;
mod reconcile;

pub use json::JsonBaselineStore;
pub use reconcile::{complete_setup, reconcile_baseline, Reconciliation};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gain::Gain;
use crate::levels::MicrophoneId;

/// Key the baseline is stored under
pub const BASELINE_KEY: &str = "ceiling_Mic_Gains";

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted baseline: ceiling ids and their gains, position for position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub mic_ids: Vec<MicrophoneId>,
    pub gain_values: Vec<Gain>,
}

impl BaselineRecord {
    pub fn new(mic_ids: Vec<MicrophoneId>, gain_values: Vec<Gain>) -> Self {
        Self { mic_ids, gain_values }
    }

    /// Usable for this ceiling list: same mics in the same order, one gain each
    pub fn matches(&self, ceiling: &[MicrophoneId]) -> bool {
        self.mic_ids == ceiling && self.gain_values.len() == self.mic_ids.len()
    }
}

/// Where the baseline record lives
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Load the baseline, `StoreError::NotFound` if none was ever saved
    async fn load(&self) -> Result<BaselineRecord>;

    /// Replace the stored baseline
    async fn save(&self, record: &BaselineRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u8]) -> Vec<MicrophoneId> {
        raw.iter().map(|&id| MicrophoneId::new(id).unwrap()).collect()
    }

    #[test]
    fn test_record_matching() {
        let record = BaselineRecord::new(ids(&[1, 2, 3]), vec![30, 30, 28]);
        assert!(record.matches(&ids(&[1, 2, 3])));
        assert!(!record.matches(&ids(&[1, 2])));
        assert!(!record.matches(&ids(&[3, 2, 1])));
        assert!(!record.matches(&ids(&[1, 2, 3, 4])));
    }

    #[test]
    fn test_short_gain_list_never_matches() {
        let record = BaselineRecord::new(ids(&[1, 2]), vec![30]);
        assert!(!record.matches(&ids(&[1, 2])));
    }

    #[test]
    fn test_record_layout() {
        let record = BaselineRecord::new(ids(&[1, 2]), vec![30, 8]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"mic_ids":[1,2],"gain_values":[30,8]}"#);
    }
}
