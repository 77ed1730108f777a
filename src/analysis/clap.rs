use serde::{Deserialize, Serialize};

use crate::analysis::level::AmplitudeSample;
use crate::config::ClapDetectionConfig;

/// A detected handclap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClapEvent {
    pub timestamp_ms: u64,
    pub level: f32,
    pub peak: f32,
}

/// Threshold detector with a refractory cooldown.
///
/// A single handclap rings for several frames; the cooldown keeps that
/// envelope from registering as more than one event.
#[derive(Debug)]
pub struct ClapDetector {
    threshold: f32,
    peak_threshold: f32,
    cooldown_ms: u64,
    max_level: f32,
    last_clap_ms: Option<u64>,
    last_sample_ms: u64,
}

impl ClapDetector {
    pub fn new(config: &ClapDetectionConfig) -> Self {
        Self {
            threshold: config.threshold,
            peak_threshold: config.threshold + config.peak_margin,
            cooldown_ms: config.cooldown_ms,
            max_level: config.max_level,
            last_clap_ms: None,
            last_sample_ms: 0,
        }
    }

    /// Reset internal state (e.g. when the pipeline restarts)
    pub fn reset(&mut self) {
        self.last_clap_ms = None;
        self.last_sample_ms = 0;
    }

    pub fn last_clap_ms(&self) -> Option<u64> {
        self.last_clap_ms
    }

    /// Feed one sample; returns a clap when it is loud enough and the
    /// cooldown since the previous clap has elapsed.
    ///
    /// Out-of-range values are clamped and timestamps that run backwards are
    /// pinned to the last seen time, never rejected.
    pub fn on_sample(&mut self, sample: AmplitudeSample) -> Option<ClapEvent> {
        let sample = sample.clamped(self.max_level);
        let now = sample.timestamp_ms.max(self.last_sample_ms);
        self.last_sample_ms = now;

        let peak = sample.peak.unwrap_or(sample.level);
        let loud_enough = sample.level > self.threshold || peak > self.peak_threshold;
        if !loud_enough {
            return None;
        }

        let cooled_down = self
            .last_clap_ms
            .map(|last| now.saturating_sub(last) > self.cooldown_ms)
            .unwrap_or(true);
        if !cooled_down {
            return None;
        }

        self.last_clap_ms = Some(now);
        tracing::debug!(
            "[ClapDetector] Clap at {}ms (level {:.0}, peak {:.0})",
            now,
            sample.level,
            peak
        );

        Some(ClapEvent {
            timestamp_ms: now,
            level: sample.level,
            peak,
        })
    }
}
