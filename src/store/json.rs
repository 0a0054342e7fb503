//! JSON file-backed key-value memory holding the baseline record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use super::{BaselineRecord, BaselineStore, Result, StoreError, BASELINE_KEY};

/// On-disk layout: named records, so other keys written by peers survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryFile {
    version: u32,
    #[serde(default)]
    records: BTreeMap<String, serde_json::Value>,
}

impl Default for MemoryFile {
    fn default() -> Self {
        Self {
            version: 1,
            records: BTreeMap::new(),
        }
    }
}

/// Baseline store persisting to a JSON file.
pub struct JsonBaselineStore {
    path: PathBuf,
}

impl JsonBaselineStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_file(&self) -> Result<MemoryFile> {
        if !self.path.exists() {
            debug!("memory file {:?} does not exist", self.path);
            return Ok(MemoryFile::default());
        }

        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            return Ok(MemoryFile::default());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    async fn write_file(&self, memory: &MemoryFile) -> Result<()> {
        let json = serde_json::to_string_pretty(memory)?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        // write then rename so a crash never leaves half a record
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl BaselineStore for JsonBaselineStore {
    async fn load(&self) -> Result<BaselineRecord> {
        let mut memory = self.read_file().await?;
        let value = memory
            .records
            .remove(BASELINE_KEY)
            .ok_or(StoreError::NotFound(BASELINE_KEY))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn save(&self, record: &BaselineRecord) -> Result<()> {
        // an unreadable file is replaced rather than blocking the save
        let mut memory = self.read_file().await.unwrap_or_default();
        memory
            .records
            .insert(BASELINE_KEY.to_string(), serde_json::to_value(record)?);
        self.write_file(&memory).await?;
        info!(mics = record.mic_ids.len(), "baseline record saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::MicrophoneId;
    use tempfile::TempDir;

    fn create_test_store() -> (JsonBaselineStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonBaselineStore::new(temp_dir.path().join("memory.json"));
        (store, temp_dir)
    }

    fn record(ids: &[u8], gains: &[i32]) -> BaselineRecord {
        BaselineRecord::new(
            ids.iter().map(|&id| MicrophoneId::new(id).unwrap()).collect(),
            gains.to_vec(),
        )
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (store, _temp_dir) = create_test_store();
        let result = tokio_test::block_on(store.load());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_save_then_load() {
        let (store, _temp_dir) = create_test_store();
        let saved = record(&[1, 2, 3, 4], &[30, 30, 28, 8]);

        tokio_test::block_on(store.save(&saved)).unwrap();
        let loaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_save_overwrites_wholesale() {
        let (store, _temp_dir) = create_test_store();
        tokio_test::block_on(store.save(&record(&[1, 2, 3, 4], &[30, 30, 30, 30]))).unwrap();
        tokio_test::block_on(store.save(&record(&[2, 3], &[20, 21]))).unwrap();

        let loaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(loaded, record(&[2, 3], &[20, 21]));
    }

    #[test]
    fn test_other_keys_survive_save() {
        let (store, temp_dir) = create_test_store();
        let path = temp_dir.path().join("memory.json");
        std::fs::write(&path, r#"{"version":1,"records":{"usb_mode":{"active":true}}}"#).unwrap();

        tokio_test::block_on(store.save(&record(&[1], &[30]))).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("usb_mode"));
        assert!(raw.contains(BASELINE_KEY));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (store, temp_dir) = create_test_store();
        std::fs::write(temp_dir.path().join("memory.json"), "{ not json").unwrap();
        let result = tokio_test::block_on(store.load());
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
