// Analysis module - clap detection and rhythm evaluation
//
// Data flow per sample:
// 1. Clamp and threshold the band level (ClapDetector, with cooldown)
// 2. On a clap, slide the rhythm window and judge interval regularity
// 3. Drive the transient "clapping" and "rhythmic" hold flags
//
// DetectionState bundles these for one pipeline session: it is created when
// the pipeline starts and dropped when it stops, which also cancels any
// pending flag timers.

pub mod clap;
pub mod hold_flag;
pub mod level;
pub mod rhythm;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::AppConfig;

pub use clap::{ClapDetector, ClapEvent};
pub use hold_flag::HoldFlag;
pub use level::{AmplitudeSample, BandAnalyzer, MAX_LEVEL};
pub use rhythm::{interval_stats, IntervalStats, RhythmEvaluator, RhythmVerdict};

/// Result of processing a single amplitude sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionUpdate {
    pub timestamp_ms: u64,
    /// Band level after clamping, for level meters
    pub level: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clap: Option<ClapEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<RhythmVerdict>,
}

/// Per-session detection state owned by the audio processing context
pub struct DetectionState {
    detector: ClapDetector,
    evaluator: RhythmEvaluator,
    clapping: HoldFlag,
    rhythmic: HoldFlag,
    max_level: f32,
    level: f32,
    clap_count: usize,
}

impl DetectionState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            detector: ClapDetector::new(&config.clap),
            evaluator: RhythmEvaluator::new(&config.rhythm),
            clapping: HoldFlag::new("clapping", Duration::from_millis(config.clap.flag_hold_ms)),
            rhythmic: HoldFlag::new(
                "rhythmic",
                Duration::from_millis(config.rhythm.flag_hold_ms),
            ),
            max_level: config.clap.max_level,
            level: 0.0,
            clap_count: 0,
        }
    }

    /// Run one sample through detector and evaluator.
    ///
    /// Flag side effects: every clap raises "clapping"; a rhythmic verdict
    /// re-arms "rhythmic"; an evaluated non-rhythmic verdict clears it; a
    /// verdict with too few claps leaves it alone.
    pub fn process(&mut self, sample: AmplitudeSample) -> DetectionUpdate {
        let sample = sample.clamped(self.max_level);
        self.level = sample.level;

        let clap = self.detector.on_sample(sample);
        let verdict = clap.as_ref().map(|event| {
            self.clapping.raise();
            let verdict = self.evaluator.on_clap(event, event.timestamp_ms);
            self.clap_count = verdict.clap_count;

            tracing::info!(
                "[ClapDetector] Clap at {}ms, level {:.0} ({} in window)",
                event.timestamp_ms,
                event.level,
                verdict.clap_count
            );

            if verdict.is_rhythmic {
                if !self.rhythmic.is_set() {
                    tracing::info!("[RhythmEvaluator] Rhythmic clapping detected");
                }
                self.rhythmic.raise();
            } else if verdict.is_evaluated() {
                self.rhythmic.lower();
            }
            verdict
        });

        DetectionUpdate {
            timestamp_ms: sample.timestamp_ms,
            level: sample.level,
            clap,
            verdict,
        }
    }

    /// Latest clamped band level
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Claps in the window as of the last clap
    pub fn clap_count(&self) -> usize {
        self.clap_count
    }

    pub fn is_clapping(&self) -> bool {
        self.clapping.is_set()
    }

    pub fn is_rhythmic(&self) -> bool {
        self.rhythmic.is_set()
    }

    pub fn subscribe_clapping(&self) -> watch::Receiver<bool> {
        self.clapping.subscribe()
    }

    pub fn subscribe_rhythmic(&self) -> watch::Receiver<bool> {
        self.rhythmic.subscribe()
    }

    /// Clear both flags and cancel their timers.
    pub fn shutdown(&mut self) {
        self.clapping.lower();
        self.rhythmic.lower();
        self.detector.reset();
        self.evaluator.clear();
        self.clap_count = 0;
        self.level = 0.0;
    }
}
