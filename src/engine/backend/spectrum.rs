use crate::analysis::{AmplitudeSample, BandAnalyzer};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

use super::AmplitudeSource;

/// Host analyser handing over one byte-magnitude spectrum per frame.
///
/// The FFT itself lives on the host side; this crate only reads its output.
pub trait SpectrumFeed: Send {
    /// Sample rate the spectrum was computed at, in Hz
    fn sample_rate(&self) -> u32;

    /// FFT size the spectrum was computed with
    fn fft_size(&self) -> usize;

    fn open(&mut self) -> Result<(), PipelineError>;

    /// Latest spectrum for the frame at `now_ms`, bins scaled to 0..=255
    fn read_spectrum(&mut self, now_ms: u64) -> Option<Vec<u8>>;

    fn close(&mut self);
}

/// Adapts a [`SpectrumFeed`] into an [`AmplitudeSource`] by averaging the
/// configured band of every spectrum.
pub struct SpectrumSource<F: SpectrumFeed> {
    feed: F,
    analyzer: BandAnalyzer,
}

impl<F: SpectrumFeed> SpectrumSource<F> {
    pub fn new(feed: F, config: &PipelineConfig) -> Self {
        let analyzer = BandAnalyzer::new(
            feed.sample_rate(),
            feed.fft_size(),
            config.band_low_hz,
            config.band_high_hz,
        );
        Self { feed, analyzer }
    }

    pub fn analyzer(&self) -> &BandAnalyzer {
        &self.analyzer
    }
}

impl<F: SpectrumFeed> AmplitudeSource for SpectrumSource<F> {
    fn open(&mut self) -> Result<(), PipelineError> {
        self.feed.open()?;
        let (low, high) = self.analyzer.bin_range();
        tracing::debug!(
            "[SpectrumSource] Averaging bins {}..{} at {} Hz / fft {}",
            low,
            high,
            self.feed.sample_rate(),
            self.feed.fft_size()
        );
        Ok(())
    }

    fn read(&mut self, now_ms: u64) -> Option<AmplitudeSample> {
        let bins = self.feed.read_spectrum(now_ms)?;
        Some(self.analyzer.analyze(&bins, now_ms))
    }

    fn close(&mut self) {
        self.feed.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFeed {
        frames: Vec<Vec<u8>>,
        closed: bool,
    }

    impl SpectrumFeed for FixedFeed {
        fn sample_rate(&self) -> u32 {
            1000
        }

        fn fft_size(&self) -> usize {
            10
        }

        fn open(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }

        fn read_spectrum(&mut self, _now_ms: u64) -> Option<Vec<u8>> {
            if self.frames.is_empty() {
                None
            } else {
                Some(self.frames.remove(0))
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn band_edges_come_from_pipeline_config() {
        let config = PipelineConfig {
            band_low_hz: 200.0,
            band_high_hz: 500.0,
            ..PipelineConfig::default()
        };
        let mut source = SpectrumSource::new(
            FixedFeed {
                frames: vec![vec![255, 255, 10, 20, 30, 255]],
                closed: false,
            },
            &config,
        );
        assert_eq!(source.analyzer().bin_range(), (2, 5));

        source.open().unwrap();
        let sample = source.read(70).unwrap();
        assert_eq!(sample.level, 20.0);
        assert_eq!(sample.peak, Some(30.0));
        assert_eq!(sample.timestamp_ms, 70);

        assert!(source.read(86).is_none());
        source.close();
        assert!(source.feed.closed);
    }
}
