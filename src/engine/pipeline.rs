//! Frame-driven audio pipeline.
//!
//! One task owns the source and the per-session [`DetectionState`]. Each
//! frame it reads one sample and processes it fully before the next tick,
//! so detection never runs concurrently with itself. A second task forwards
//! rhythmic flag changes into the alarm arbiter; both end when the pipeline
//! stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alarm::AlarmArbiter;
use crate::analysis::{DetectionState, DetectionUpdate};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::telemetry::{SentinelEventKind, TelemetryCollector};

use super::backend::{AmplitudeSource, TimeSource};

/// Shared handles the pipeline publishes into
pub struct PipelineContext {
    pub time: Arc<dyn TimeSource>,
    pub telemetry: Arc<TelemetryCollector>,
    pub updates: broadcast::Sender<DetectionUpdate>,
    pub arbiter: AlarmArbiter,
}

/// A started pipeline session
pub struct RunningPipeline {
    shutdown_tx: Option<oneshot::Sender<()>>,
    frames: JoinHandle<()>,
    bridge: JoinHandle<()>,
}

impl RunningPipeline {
    /// Open `source` and start processing frames.
    ///
    /// The source is opened before anything is spawned; if that fails the
    /// session never starts and nothing needs cleaning up.
    pub fn spawn(
        config: &AppConfig,
        mut source: Box<dyn AmplitudeSource>,
        ctx: PipelineContext,
    ) -> Result<Self, PipelineError> {
        source.open()?;

        let state = DetectionState::new(config);
        let bridge = spawn_rhythm_bridge(&state, ctx.arbiter.clone());
        let frame = Duration::from_millis(config.pipeline.frame_interval_ms.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        ctx.telemetry
            .record(ctx.time.now_ms(), SentinelEventKind::PipelineStarted);
        tracing::info!(
            "[AudioPipeline] Started, frame interval {}ms",
            frame.as_millis()
        );

        let frames = tokio::spawn(run_frames(state, source, frame, shutdown_rx, ctx));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            frames,
            bridge,
        })
    }

    /// Signal the frame loop and wait until the source is released and the
    /// rhythm bridge has exited.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.frames).await {
            tracing::warn!("[AudioPipeline] Frame task ended abnormally: {}", err);
        }
        // A forward already in progress lands before stop returns
        self.bridge.abort();
        let _ = (&mut self.bridge).await;
    }

    /// Frame loop has exited
    pub fn is_finished(&self) -> bool {
        self.frames.is_finished()
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        // Dropping without stop() still tears the session down
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.bridge.abort();
    }
}

fn spawn_rhythm_bridge(state: &DetectionState, arbiter: AlarmArbiter) -> JoinHandle<()> {
    let mut rhythmic_rx = state.subscribe_rhythmic();
    tokio::spawn(async move {
        while rhythmic_rx.changed().await.is_ok() {
            let rhythmic = *rhythmic_rx.borrow_and_update();
            arbiter.set_rhythmic(rhythmic);
        }
    })
}

async fn run_frames(
    mut state: DetectionState,
    mut source: Box<dyn AmplitudeSource>,
    frame: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
    ctx: PipelineContext,
) {
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                let now_ms = ctx.time.now_ms();
                let Some(sample) = source.read(now_ms) else {
                    continue;
                };
                let update = state.process(sample);
                publish(&ctx, &update);
            }
        }
    }

    state.shutdown();
    source.close();
    ctx.telemetry
        .record(ctx.time.now_ms(), SentinelEventKind::PipelineStopped);
    tracing::info!("[AudioPipeline] Stopped, input released");
}

fn publish(ctx: &PipelineContext, update: &DetectionUpdate) {
    if let Some(clap) = &update.clap {
        let clap_count = update.verdict.map(|v| v.clap_count).unwrap_or(1);
        ctx.telemetry.record(
            clap.timestamp_ms,
            SentinelEventKind::Clap {
                level: clap.level,
                clap_count,
            },
        );
    }
    if let Some(verdict) = &update.verdict {
        ctx.telemetry.record(
            verdict.timestamp_ms,
            SentinelEventKind::RhythmVerdict {
                clap_count: verdict.clap_count,
                std_dev_ms: verdict.stats.map(|stats| stats.std_dev_ms),
                is_rhythmic: verdict.is_rhythmic,
            },
        );
    }
    // No receivers is fine
    let _ = ctx.updates.send(update.clone());
}
