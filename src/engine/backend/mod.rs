//! Backend abstractions for the watcher core.
//!
//! The pipeline reads amplitude samples through [`AmplitudeSource`] (directly,
//! or from a host FFT through [`SpectrumSource`]) and
//! stamps everything with a [`TimeSource`], so the host decides where audio
//! comes from and tests can drive both from tokio's paused clock.

use tokio::time::Instant;

use crate::analysis::AmplitudeSample;
use crate::error::PipelineError;

mod scripted;
mod spectrum;
pub use scripted::{ScriptedSource, SourceLifecycle};
pub use spectrum::{SpectrumFeed, SpectrumSource};

/// Trait implemented by audio input adapters.
///
/// The pipeline owns its source exclusively: `open` is called once before
/// the first read and `close` once after the last, even when the session
/// ends early.
pub trait AmplitudeSource: Send {
    /// Acquire the device. Failure is fatal for the session.
    fn open(&mut self) -> Result<(), PipelineError>;

    /// Next sample for the frame at `now_ms`, or `None` when nothing is ready.
    fn read(&mut self, now_ms: u64) -> Option<AmplitudeSample>;

    /// Release the device.
    fn close(&mut self);
}

/// Trait representing a monotonic time source used for timestamps.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since this source was created
    fn now_ms(&self) -> u64;
}

/// Default time source backed by tokio's clock, which tests can pause.
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
