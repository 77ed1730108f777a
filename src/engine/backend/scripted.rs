use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::analysis::AmplitudeSample;
use crate::error::PipelineError;

use super::AmplitudeSource;

/// Open/close counters shared between a source and its observers.
#[derive(Debug, Default)]
pub struct SourceLifecycle {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl SourceLifecycle {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Opened and not yet closed
    pub fn is_open(&self) -> bool {
        self.opens() > self.closes()
    }
}

/// Scripted source used for deterministic testing and CLI tooling.
///
/// Sample timestamps are relative to the first read. Each read returns the
/// loudest scripted sample that became due since the previous read, shifted
/// onto the caller's clock, or silence when nothing is due.
pub struct ScriptedSource {
    samples: Vec<AmplitudeSample>,
    cursor: usize,
    base_ms: Option<u64>,
    open_failure: Option<String>,
    lifecycle: Arc<SourceLifecycle>,
}

impl ScriptedSource {
    pub fn new(mut samples: Vec<AmplitudeSample>) -> Self {
        samples.sort_by_key(|sample| sample.timestamp_ms);
        Self {
            samples,
            cursor: 0,
            base_ms: None,
            open_failure: None,
            lifecycle: Arc::new(SourceLifecycle::default()),
        }
    }

    /// Source whose `open` always fails, standing in for a missing microphone.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut source = Self::new(Vec::new());
        source.open_failure = Some(reason.into());
        source
    }

    pub fn lifecycle(&self) -> Arc<SourceLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// All scripted samples have been emitted
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    /// Timestamp of the last scripted sample
    pub fn duration_ms(&self) -> u64 {
        self.samples
            .last()
            .map(|sample| sample.timestamp_ms)
            .unwrap_or(0)
    }
}

impl AmplitudeSource for ScriptedSource {
    fn open(&mut self) -> Result<(), PipelineError> {
        if let Some(reason) = &self.open_failure {
            return Err(PipelineError::InputUnavailable {
                reason: reason.clone(),
            });
        }
        self.lifecycle.opens.fetch_add(1, Ordering::SeqCst);
        self.cursor = 0;
        self.base_ms = None;
        Ok(())
    }

    fn read(&mut self, now_ms: u64) -> Option<AmplitudeSample> {
        let base = *self.base_ms.get_or_insert(now_ms);
        let elapsed = now_ms.saturating_sub(base);

        let mut loudest: Option<AmplitudeSample> = None;
        while let Some(sample) = self.samples.get(self.cursor) {
            if sample.timestamp_ms > elapsed {
                break;
            }
            if loudest.map_or(true, |current| sample.level > current.level) {
                loudest = Some(*sample);
            }
            self.cursor += 1;
        }

        Some(match loudest {
            Some(sample) => AmplitudeSample {
                timestamp_ms: base + sample.timestamp_ms,
                ..sample
            },
            None => AmplitudeSample::new(0.0, now_ms),
        })
    }

    fn close(&mut self) {
        self.lifecycle.closes.fetch_add(1, Ordering::SeqCst);
    }
}
