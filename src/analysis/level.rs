//! Band level extraction from byte-magnitude spectra.
//!
//! The host's analyser hands over one spectrum per frame (bins scaled to
//! 0..=255). Claps are broadband, so the level fed to the clap detector is
//! the mean magnitude across roughly 500 Hz..8 kHz, with the loudest bin
//! kept alongside as a secondary peak statistic.

use serde::{Deserialize, Serialize};

/// Upper bound of the byte-scaled level range
pub const MAX_LEVEL: f32 = 255.0;

/// One loudness reading taken at a monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeSample {
    /// Average band magnitude
    pub level: f32,
    /// Loudest bin in the band, when the sampler reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<f32>,
    /// Milliseconds since the pipeline clock started
    pub timestamp_ms: u64,
}

impl AmplitudeSample {
    pub fn new(level: f32, timestamp_ms: u64) -> Self {
        Self {
            level,
            peak: None,
            timestamp_ms,
        }
    }

    pub fn with_peak(mut self, peak: f32) -> Self {
        self.peak = Some(peak);
        self
    }

    /// Clamp level and peak into `0..=max_level`; NaN reads as silence.
    pub fn clamped(self, max_level: f32) -> Self {
        Self {
            level: clamp_level(self.level, max_level),
            peak: self.peak.map(|peak| clamp_level(peak, max_level)),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

fn clamp_level(value: f32, max_level: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max_level)
    }
}

/// Maps a spectrum frame to an [`AmplitudeSample`]
#[derive(Debug, Clone)]
pub struct BandAnalyzer {
    low_bin: usize,
    high_bin: usize,
}

impl BandAnalyzer {
    /// # Arguments
    /// * `sample_rate` - Analyser sample rate in Hz
    /// * `fft_size` - FFT size the spectrum was computed with
    /// * `low_hz` / `high_hz` - Band edges; bins in `[low, high)` are averaged
    pub fn new(sample_rate: u32, fft_size: usize, low_hz: f32, high_hz: f32) -> Self {
        let to_bin = |hz: f32| -> usize {
            if sample_rate == 0 {
                return 0;
            }
            ((hz / sample_rate as f32) * fft_size as f32).floor().max(0.0) as usize
        };
        Self {
            low_bin: to_bin(low_hz),
            high_bin: to_bin(high_hz),
        }
    }

    pub fn bin_range(&self) -> (usize, usize) {
        (self.low_bin, self.high_bin)
    }

    /// Average and peak magnitude of the band within `bins`
    pub fn analyze(&self, bins: &[u8], timestamp_ms: u64) -> AmplitudeSample {
        let high = self.high_bin.min(bins.len());
        if self.low_bin >= high {
            return AmplitudeSample::new(0.0, timestamp_ms).with_peak(0.0);
        }

        let band = &bins[self.low_bin..high];
        let sum: u32 = band.iter().map(|&b| b as u32).sum();
        let max = band.iter().copied().max().unwrap_or(0);
        let average = sum as f32 / band.len() as f32;

        AmplitudeSample::new(average, timestamp_ms).with_peak(max as f32)
    }
}
