//! Configuration management for detector and alarm tuning
//!
//! This module provides runtime configuration loading from JSON files.
//! The clap threshold, cooldowns and rhythm statistics limits are
//! empirically tuned values, so they live here as data rather than as
//! constants baked into the detectors. Missing sections or fields fall
//! back to the documented defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub clap: ClapDetectionConfig,
    pub rhythm: RhythmConfig,
    pub alarm: AlarmConfig,
    pub notification: NotificationConfig,
    pub pipeline: PipelineConfig,
}

/// Clap detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClapDetectionConfig {
    /// Band level that counts as a clap when exceeded
    pub threshold: f32,
    /// Extra headroom the peak bin must clear on top of `threshold`
    pub peak_margin: f32,
    /// Minimum spacing between two claps in milliseconds
    pub cooldown_ms: u64,
    /// How long the "currently clapping" indicator stays raised
    pub flag_hold_ms: u64,
    /// Upper bound of the sample range; larger values are clamped
    pub max_level: f32,
}

impl Default for ClapDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 120.0,
            peak_margin: 50.0,
            cooldown_ms: 200,
            flag_hold_ms: 300,
            max_level: 255.0,
        }
    }
}

/// Rhythm evaluator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Minimum claps in the window before regularity is judged
    pub min_claps: usize,
    /// Interval standard deviation must stay strictly below this (ms)
    pub max_std_dev_ms: f64,
    /// How long the rhythmic flag stays raised after the latest rhythmic verdict
    pub flag_hold_ms: u64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            window_ms: 4000,
            min_claps: 3,
            max_std_dev_ms: 300.0,
            flag_hold_ms: 2000,
        }
    }
}

/// Alarm arbitration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Delay between an episode starting and its alert being sent
    pub send_delay_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: 1000,
        }
    }
}

/// Notification throttle parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Minimum spacing between successful manual sends
    pub manual_cooldown_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            manual_cooldown_ms: 10_000,
        }
    }
}

/// Sampling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Polling period of the sampling loop (one "frame")
    pub frame_interval_ms: u64,
    /// Lower edge of the band averaged into the clap level
    pub band_low_hz: f32,
    /// Upper edge of the band averaged into the clap level
    pub band_high_hz: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            band_low_hz: 500.0,
            band_high_hz: 8000.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing
    /// or does not parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the bundled assets directory
    pub fn load() -> Self {
        Self::load_from_file("assets/clapwatch_config.json")
    }
}
