//! Configuration loading and management

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gain::Gain;
use crate::levels::MicrophoneId;

/// Environment variable pointing at an alternative tuning file
pub const CONFIG_ENV: &str = "CEILING_DUCKER_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Where the baseline gain record is persisted
    pub store_path: PathBuf,

    /// Ducking behaviour
    pub ducker: DuckerConfig,
}

impl Config {
    /// Load configuration from environment, the optional tuning file and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let tuning_override = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(Path::new(&home), tuning_override)
    }

    /// Build the configuration rooted at `home`, reading the tuning file from
    /// `tuning_override` when given
    pub fn load_from(home: &Path, tuning_override: Option<PathBuf>) -> Result<Self> {
        let data_dir = home
            .join(".local")
            .join("share")
            .join("ceiling-ducker");

        let socket_path = data_dir.join("daemon.sock");
        let store_path = data_dir.join("memory.json");

        let tuning_path = tuning_override.unwrap_or_else(|| {
            home.join(".config").join("ceiling-ducker").join("config.json")
        });

        let ducker = if tuning_path.exists() {
            let contents = std::fs::read_to_string(&tuning_path)
                .with_context(|| format!("failed to read {}", tuning_path.display()))?;
            let ducker = DuckerConfig::from_json(&contents)
                .with_context(|| format!("failed to parse {}", tuning_path.display()))?;
            info!(path = ?tuning_path, "tuning file loaded");
            ducker
        } else {
            DuckerConfig::default()
        };

        Ok(Self {
            socket_path,
            data_dir,
            store_path,
            ducker,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Which connectors are watched, which trigger ducking and which get ducked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicPartition {
    pub monitored: Vec<MicrophoneId>,
    pub amplified: Vec<MicrophoneId>,
    pub ceiling: Vec<MicrophoneId>,
}

impl Default for MicPartition {
    fn default() -> Self {
        Self {
            monitored: mic_ids(&[1, 2, 3, 4, 5, 6, 7, 8]),
            amplified: mic_ids(&[5, 6]),
            ceiling: mic_ids(&[1, 2, 3, 4]),
        }
    }
}

fn mic_ids(ids: &[u8]) -> Vec<MicrophoneId> {
    ids.iter().filter_map(|&id| MicrophoneId::new(id).ok()).collect()
}

/// Levels and debounce lengths for the hysteresis classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// VU level an amplified mic must exceed to count toward ducking
    pub attack_level: u32,
    /// VU level the latched mic must drop below to count toward release
    pub release_level: u32,
    /// Consecutive loud samples before ducking
    pub attack_frames: u32,
    /// Consecutive quiet samples before fading back in
    pub release_frames: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            attack_level: 40,
            release_level: 20,
            attack_frames: 3,
            release_frames: 3,
        }
    }
}

/// Tunables for the ducking automation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckerConfig {
    pub microphones: MicPartition,
    pub thresholds: Thresholds,
    /// Amount subtracted from each ceiling baseline while ducked
    pub ducking_value: Gain,
    /// Gain added per sample tick while fading back in
    pub fade_in_step: Gain,
    /// VU meter interval requested from the sample source
    pub sample_interval_ms: u64,
    /// Show an alert every time ducking starts
    pub show_ducking_alert: bool,
    /// Gains the mirror device starts with before the bridge reports any
    pub initial_gains: BTreeMap<MicrophoneId, Gain>,
}

impl Default for DuckerConfig {
    fn default() -> Self {
        Self {
            microphones: MicPartition::default(),
            thresholds: Thresholds::default(),
            ducking_value: 7,
            fade_in_step: 3,
            sample_interval_ms: 100,
            show_ducking_alert: false,
            initial_gains: BTreeMap::new(),
        }
    }
}

impl DuckerConfig {
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Check the microphone partition and tunables before anything runs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mics = &self.microphones;

        let monitored = distinct("monitored", &mics.monitored)?;
        let amplified = distinct("amplified", &mics.amplified)?;
        let ceiling = distinct("ceiling", &mics.ceiling)?;

        if monitored.len() <= amplified.len() || monitored.len() <= ceiling.len() {
            return Err(ConfigError::TooFewMonitored {
                monitored: monitored.len(),
                amplified: amplified.len(),
                ceiling: ceiling.len(),
            });
        }

        if let Some(id) = mics.amplified.iter().find(|id| !mics.monitored.contains(id)) {
            return Err(ConfigError::NotMonitored { role: "amplified", mic: *id });
        }

        if let Some(id) = mics.ceiling.iter().find(|id| !mics.monitored.contains(id)) {
            return Err(ConfigError::NotMonitored { role: "ceiling", mic: *id });
        }

        if let Some(id) = mics.amplified.iter().find(|id| mics.ceiling.contains(id)) {
            return Err(ConfigError::Overlap(*id));
        }

        let t = &self.thresholds;
        if t.attack_frames == 0 || t.release_frames == 0 {
            return Err(ConfigError::InvalidTunable("attack and release frame counts must be at least 1"));
        }
        if self.fade_in_step < 1 {
            return Err(ConfigError::InvalidTunable("fade_in_step must be at least 1"));
        }
        if self.ducking_value < 0 {
            return Err(ConfigError::InvalidTunable("ducking_value cannot be negative"));
        }

        Ok(())
    }
}

/// The ids of one role as a set, rejecting any listed twice
fn distinct(role: &'static str, ids: &[MicrophoneId]) -> Result<BTreeSet<MicrophoneId>, ConfigError> {
    let mut seen = BTreeSet::new();
    for &mic in ids {
        if !seen.insert(mic) {
            return Err(ConfigError::Duplicate { role, mic });
        }
    }
    Ok(seen)
}

/// Fatal configuration problems; the automation refuses to run with any of these
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "there cannot be as many amplified ({amplified}) or ceiling ({ceiling}) mics as monitored mics ({monitored})"
    )]
    TooFewMonitored {
        monitored: usize,
        amplified: usize,
        ceiling: usize,
    },

    #[error("{mic} is listed more than once as a {role} mic")]
    Duplicate { role: &'static str, mic: MicrophoneId },

    #[error("{role} {mic} is not in the monitored set")]
    NotMonitored { role: &'static str, mic: MicrophoneId },

    #[error("{0} cannot be both an amplified and a ceiling mic")]
    Overlap(MicrophoneId),

    #[error("{0}")]
    InvalidTunable(&'static str),
}
